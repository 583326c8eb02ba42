//! Minimal sabre example: a users API with auth middleware, validation, an
//! error handler, and the generated API description.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Requests are dispatched in memory through `Router::handle`; hand the same
//! `Router` to a hyper connection to serve it over the network.

use bytes::Bytes;
use sabre::http::{Method, Request, StatusCode};
use sabre::validation::JsonSchema;
use sabre::{
    App, BodySchema, Config, Context, DispatchError, DocMetadata, Error, Next, Response,
    ResponseBuilder, ResponseSchema, RouteOptions, Validation,
};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let config = Config::new().with_base_path("/api").with_document(json!({
        "openapi": "3.1.0",
        "info": { "title": "Users", "version": "1.0.0" },
    }));
    let mut app = App::with_config(config);

    let user = JsonSchema::new(json!({
        "type": "object",
        "required": ["name"],
        "properties": { "name": { "type": "string", "minLength": 1 } },
    }))?;

    app.on_error(validation_errors)?
        .get("/healthz", healthz)?
        .group_with("/users", DocMetadata::new().tag("Users"), |users| {
            users.middleware(require_token)?;
            users.route(
                Method::GET,
                "/:id",
                get_user,
                RouteOptions::new()
                    .validation(Validation::new().response(200, ResponseSchema::json(user.clone())))
                    .docs(DocMetadata::new().summary("Fetch a user")),
            )?;
            users.route(
                Method::POST,
                "/",
                create_user,
                RouteOptions::new()
                    .validation(
                        Validation::new()
                            .body(BodySchema::json(user.clone()).required(true))
                            .response(201, ResponseSchema::json(user.clone())),
                    )
                    .docs(DocMetadata::new().summary("Create a user")),
            )?;
            users.delete("/:id", delete_user)?;
            Ok(())
        })?;

    println!("{}", serde_json::to_string_pretty(&app.openapi()?)?);

    let router = app.into_router()?;
    for request in [
        Request::get("/api/healthz").body(Bytes::new()),
        Request::get("/api/users/42").header("authorization", "Bearer t").body(Bytes::new()),
        Request::get("/api/users/42").body(Bytes::new()),
        Request::post("/api/users")
            .header("authorization", "Bearer t")
            .header("content-type", "application/json")
            .body(Bytes::from_static(br#"{"name":"alice"}"#)),
        Request::post("/api/users")
            .header("authorization", "Bearer t")
            .header("content-type", "application/json")
            .body(Bytes::from_static(br#"{"name":""}"#)),
        Request::delete("/api/users/42").header("authorization", "Bearer t").body(Bytes::new()),
        Request::get("/api/nope").body(Bytes::new()),
    ] {
        let request = request.map_err(|e| Error::InvalidHeader(e.to_string()))?;
        let line = format!("{} {}", request.method(), request.uri());
        let response = router.handle(request).await?;
        println!("{line} -> {} {}", response.status(), String::from_utf8_lossy(response.body()));
    }
    Ok(())
}

async fn healthz(_: Context, _: ResponseBuilder) -> Result<&'static str, Error> {
    Ok("ok")
}

async fn require_token(
    ctx: Context,
    res: ResponseBuilder,
    next: Next,
) -> Result<(), DispatchError> {
    if ctx.header("authorization").is_none() {
        res.status(StatusCode::UNAUTHORIZED).json(&json!({ "error": "missing token" }))?;
        return Ok(());
    }
    ctx.set_state("user", "alice");
    next.run().await
}

async fn get_user(ctx: Context, res: ResponseBuilder) -> Result<Response, Error> {
    let id = ctx.param("id").unwrap_or_default();
    res.json(&json!({ "id": id, "name": ctx.state("user") }))
}

async fn create_user(ctx: Context, res: ResponseBuilder) -> Result<Response, Error> {
    let user = ctx.body()?.clone();
    res.status(StatusCode::CREATED).header("location", "/api/users/99")?.json(&user)
}

async fn delete_user(_: Context, _: ResponseBuilder) -> Result<StatusCode, Error> {
    Ok(StatusCode::NO_CONTENT)
}

async fn validation_errors(
    err: DispatchError,
    _: Context,
    res: ResponseBuilder,
) -> Result<Option<Response>, Error> {
    let Some(invalid) = err.validation() else {
        return Ok(None);
    };
    let response = res
        .status(StatusCode::BAD_REQUEST)
        .json(&json!({ "error": invalid.message(), "at": invalid.location() }))?;
    Ok(Some(response))
}
