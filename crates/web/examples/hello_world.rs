use easy_web::{RequestContext, RouteTable, Server};

fn hello_world(ctx: &mut RequestContext) {
    ctx.response_mut().write_raw("hello world");
}

#[tokio::main]
async fn main() {
    let routes = RouteTable::builder().route("/", hello_world).build();

    Server::builder().routes(routes).address("127.0.0.1:3000").build().unwrap().start().await;
}
