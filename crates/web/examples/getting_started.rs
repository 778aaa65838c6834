use easy_web::response::ImageEncoding;
use easy_web::{RequestContext, RouteTable, Server};
use image::{DynamicImage, Rgb, RgbImage};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize, Debug)]
pub struct User {
    name: String,
    zip: String,
}

// curl -v "http://127.0.0.1:8080/user?id=7" -H 'Content-Type: application/json' -d '{"name":"hello"}'
fn user(ctx: &mut RequestContext) {
    let id = ctx.require_int64("id");
    let name = ctx.require_string("name");
    ctx.response_mut().write_data(&json!({ "id": id, "name": name }));
}

// curl -v -d "name=hello&zip=world" http://127.0.0.1:8080/form
fn form(ctx: &mut RequestContext) {
    let user = ctx.require_struct::<User>();
    ctx.response_mut().write_success(Some(&format!("{} lives at {}", user.name, user.zip)));
}

// curl -v -F "title=hi" -F "doc=@Cargo.toml" http://127.0.0.1:8080/upload
fn upload(ctx: &mut RequestContext) {
    let uploaded = match ctx.params().file() {
        Some(file) => json!({ "field": file.field_name(), "name": file.file_name(), "size": file.len() }),
        None => ctx.response_mut().write_error_and_terminate("no file uploaded", 400, []),
    };
    ctx.response_mut().write_data(&uploaded);
}

// curl -v "http://127.0.0.1:8080/body?extra=1" -d '{"nested":{"a":1}}' -H 'Content-Type: application/json'
fn body(ctx: &mut RequestContext) {
    let body = ctx.body();
    ctx.response_mut().write_data(&body);
}

// curl -v -o square.png "http://127.0.0.1:8080/square?size=64"
fn square(ctx: &mut RequestContext) {
    let size = ctx.require_parsed::<u32>("size");
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(size, size, Rgb([30, 144, 255])));
    ctx.response_mut().write_image(&image, ImageEncoding::png());
}

fn broken(_ctx: &mut RequestContext) {
    panic!("this handler is broken");
}

#[tokio::main]
async fn main() {
    let routes = RouteTable::builder()
        .route("/user", user)
        .route("/form", form)
        .route("/upload", upload)
        .route("/body", body)
        .route("/square", square)
        .route("/broken", broken)
        .build();

    Server::builder()
        .routes(routes)
        .address("127.0.0.1:8080")
        .multipart_limit(8 << 20)
        .build()
        .unwrap()
        .start()
        .await;
}
