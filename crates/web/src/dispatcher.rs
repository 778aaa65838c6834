//! Route table and the protected dispatch boundary.
//!
//! The boundary is the only place that catches unwinds. A [`Terminated`]
//! payload means the handler already answered; any other payload is a handler
//! fault and is answered with a 500 envelope carrying the panic backtrace.
//!
//! [`Terminated`]: crate::terminate::Terminated

use crate::context::RequestContext;
use crate::response::{BufferedWriter, ResponseWriter};
use crate::terminate::is_termination;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};

pub const ROUTE_NOT_FOUND: &str = "route not found";
pub const ROUTE_NOT_FOUND_CODE: i32 = 404;
pub const HANDLER_FAULT_CODE: i32 = 500;

type BoxedHandler<W> = Box<dyn Fn(&mut RequestContext<W>) + Send + Sync>;

/// Handlers keyed by route, fixed once built.
pub struct RouteTable<W = BufferedWriter> {
    routes: HashMap<String, BoxedHandler<W>>,
}

impl<W> RouteTable<W> {
    pub fn builder() -> RouteTableBuilder<W> {
        RouteTableBuilder { routes: HashMap::new() }
    }

    pub fn get(&self, route: &str) -> Option<&(dyn Fn(&mut RequestContext<W>) + Send + Sync)> {
        self.routes.get(route).map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<W> fmt::Debug for RouteTable<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.routes.keys()).finish()
    }
}

pub struct RouteTableBuilder<W = BufferedWriter> {
    routes: HashMap<String, BoxedHandler<W>>,
}

impl<W> RouteTableBuilder<W> {
    /// Registers `handler` for `route`, replacing any earlier registration.
    pub fn route<F>(mut self, route: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut RequestContext<W>) + Send + Sync + 'static,
    {
        let route = route.into();
        if self.routes.insert(route.clone(), Box::new(handler)).is_some() {
            warn!(route, "handler registered twice, keeping the last one");
        }
        self
    }

    pub fn build(self) -> RouteTable<W> {
        RouteTable { routes: self.routes }
    }
}

impl<W> fmt::Debug for RouteTableBuilder<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.routes.keys()).finish()
    }
}

#[derive(Debug)]
pub struct Dispatcher<W = BufferedWriter> {
    routes: RouteTable<W>,
}

impl<W: ResponseWriter> Dispatcher<W> {
    pub fn new(routes: RouteTable<W>) -> Self {
        install_trace_hook();
        Self { routes }
    }

    pub fn routes(&self) -> &RouteTable<W> {
        &self.routes
    }

    /// Runs the handler of `route` against `ctx`.
    ///
    /// Always returns normally. An unknown route is answered with a 404
    /// envelope without running anything; a handler fault is answered with a
    /// 500 envelope unless the handler had already written its response.
    pub fn dispatch(&self, route: &str, ctx: &mut RequestContext<W>) {
        let Some(handler) = self.routes.get(route) else {
            debug!(route, "no handler registered");
            ctx.response_mut().write_error(ROUTE_NOT_FOUND, ROUTE_NOT_FOUND_CODE, []);
            return;
        };

        clear_trace();
        let payload = match panic::catch_unwind(AssertUnwindSafe(|| handler(ctx))) {
            Ok(()) => {
                debug!(route, "handler returned without terminating");
                return;
            }
            Err(payload) if is_termination(payload.as_ref()) => {
                debug!(route, "response written, handler terminated");
                return;
            }
            Err(payload) => payload,
        };

        let message = panic_message(payload.as_ref());
        let trace = take_trace();
        error!(route, cause = %message, "handler panicked");

        if ctx.response().state().is_written() {
            warn!(route, "response already written before the fault, not answering with 500");
            return;
        }
        ctx.response_mut().write_error(&message, HANDLER_FAULT_CODE, [Value::String(trace)]);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::new()
    };

    if message.is_empty() { "handler panicked".to_owned() } else { message }
}

thread_local! {
    static LAST_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static TRACE_HOOK: OnceCell<()> = OnceCell::new();

/// Records a backtrace on the panicking thread before the previous hook runs.
fn install_trace_hook() {
    TRACE_HOOK.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            LAST_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Drops any backtrace left on this thread by an earlier request.
fn clear_trace() {
    LAST_TRACE.with(|slot| *slot.borrow_mut() = None);
}

fn take_trace() -> String {
    LAST_TRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}
