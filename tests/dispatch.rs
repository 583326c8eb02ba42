mod common;

use std::collections::HashMap;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::Service;
use sabre::http::{self, Method, StatusCode};
use sabre::validation::JsonSchema;
use sabre::{
    App, BodySchema, ContentType, Context, DispatchError, Error, Next, Response, ResponseBuilder,
    ResponseSchema, RouteOptions, Validation,
};
use serde_json::{Value, json};

use common::{
    Counting, Rule, bad_request, bystander, entries, fail, json_request, log, recorder, request,
    text, tracer,
};

// ── Middleware ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn middleware_can_short_circuit() {
    let log = log();
    let mut app = App::new();
    app.middleware(|_: Context, res: ResponseBuilder, _: Next| async move {
        res.status(StatusCode::UNAUTHORIZED).text("denied")?;
        Ok::<_, Error>(())
    })
    .unwrap();
    app.get("/secret", recorder(&log, "handler")).unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/secret")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(text(&response), "denied");
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn silent_short_circuit_is_empty_ok() {
    let log = log();
    let mut app = App::new();
    app.middleware(|_: Context, _: ResponseBuilder, _: Next| async { Ok::<_, Error>(()) }).unwrap();
    app.get("/", recorder(&log, "handler")).unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.body().is_empty());
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn middleware_state_reaches_the_handler() {
    let mut app = App::new();
    app.middleware(|ctx: Context, _: ResponseBuilder, next: Next| async move {
        ctx.set_state("user", json!({ "id": 7 }));
        next.run().await
    })
    .unwrap();
    app.get("/me", |ctx: Context, res: ResponseBuilder| async move {
        res.json(&ctx.state("user").unwrap_or(Value::Null))
    })
    .unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/me")).await.unwrap();
    assert_eq!(text(&response), r#"{"id":7}"#);
}

#[tokio::test]
async fn middleware_sees_the_handler_outcome() {
    let mut app = App::new();
    app.middleware(|_: Context, res: ResponseBuilder, next: Next| async move {
        next.run().await?;
        assert!(res.is_committed());
        Ok::<_, DispatchError>(())
    })
    .unwrap();
    app.get("/", |_: Context, _: ResponseBuilder| async { Ok::<_, Error>("done") }).unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/")).await.unwrap();
    assert_eq!(text(&response), "done");
}

// ── Responses ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn builder_commit_wins_over_returned_response() {
    let mut app = App::new();
    app.get("/", |_: Context, res: ResponseBuilder| async move {
        res.text("from builder")?;
        Ok::<_, Error>(Response::text("returned"))
    })
    .unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/")).await.unwrap();
    assert_eq!(text(&response), "from builder");
}

#[tokio::test]
async fn nothing_committed_ends_with_builder_status() {
    let mut app = App::new();
    app.delete("/users/:id", |_: Context, res: ResponseBuilder| async move {
        res.status(StatusCode::NO_CONTENT).header("x-deleted", "1")?;
        Ok::<_, Error>(())
    })
    .unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::DELETE, "/users/1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["x-deleted"], "1");
    assert!(response.body().is_empty());
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let router = App::new().into_router().unwrap();
    let response = router.handle(request(Method::GET, "/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(text(&response), "Not Found");
}

// ── Error handlers ────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_committing_error_handler_wins() {
    let log = log();
    let mut app = App::new();
    app.on_error(bystander(&log, "first")).unwrap();
    let second = {
        let log = log.clone();
        move |_: DispatchError, _: Context, res: ResponseBuilder| {
            let log = log.clone();
            async move {
                log.lock().push("second".to_owned());
                res.status(StatusCode::IM_A_TEAPOT).text("handled")?;
                Ok::<_, Error>(())
            }
        }
    };
    app.on_error(second).unwrap();
    app.on_error(bystander(&log, "third")).unwrap();
    app.get("/", fail).unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(text(&response), "handled");
    assert_eq!(entries(&log), ["first", "second"]);
}

#[tokio::test]
async fn error_handler_may_return_a_response() {
    let mut app = App::new();
    app.on_error(|err: DispatchError, _: Context, _: ResponseBuilder| async move {
        Ok::<_, Error>(Response::text(err.to_string()).with_status(StatusCode::BAD_GATEWAY))
    })
    .unwrap();
    app.get("/", fail).unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(text(&response), "boom");
}

#[tokio::test]
async fn unhandled_error_is_internal_server_error() {
    let log = log();
    let mut app = App::new();
    app.on_error(bystander(&log, "only")).unwrap();
    app.get("/", |_: Context, res: ResponseBuilder| async move {
        res.text("partial")?;
        Err::<(), _>(Error::InvalidHeader("late failure".to_owned()))
    })
    .unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text(&response), "Internal Server Error");
    assert_eq!(entries(&log), ["only"]);
}

#[tokio::test]
async fn failing_error_handler_surfaces_to_the_caller() {
    let mut app = App::new();
    app.on_error(|_: DispatchError, _: Context, _: ResponseBuilder| async {
        Err::<(), _>(std::io::Error::other("handler broke"))
    })
    .unwrap();
    app.get("/", fail).unwrap();

    let err = app.routes()[0].run(request(Method::GET, "/"), HashMap::new()).await.err().unwrap();
    match err {
        Error::Handler(inner) => assert_eq!(inner.to_string(), "handler broke"),
        other => panic!("expected Error::Handler, got {other:?}"),
    }
}

#[tokio::test]
async fn middleware_errors_reach_error_handlers() {
    let log = log();
    let mut app = App::new();
    app.on_error(bad_request).unwrap();
    app.middleware(|_: Context, _: ResponseBuilder, _: Next| async {
        Err::<(), _>(sabre::ValidationError::new("no tenant").at("headers.x-tenant"))
    })
    .unwrap();
    app.get("/", recorder(&log, "handler")).unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(text(&response), "headers.x-tenant");
    assert!(entries(&log).is_empty());
}

// ── Validation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_path_param_is_rejected_before_middleware() {
    let log = log();
    let mut app = App::new().with_validator(Counting::default()).unwrap();
    app.on_error(bad_request).unwrap();
    app.middleware(tracer(&log, "mw")).unwrap();
    let id = Validation::new().param("id", Rule::Integer);
    app.route(Method::GET, "/users/:id", recorder(&log, "handler"), id).unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/users/abc")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(text(&response), "params.id");
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn validated_params_are_coerced() {
    let mut app = App::new().with_validator(Counting::default()).unwrap();
    app.route(
        Method::GET,
        "/users/:id",
        |ctx: Context, res: ResponseBuilder| async move { res.json(&ctx.params()?["id"]) },
        Validation::new().param("id", Rule::Integer),
    )
    .unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/users/42")).await.unwrap();
    assert_eq!(text(&response), "42");
}

#[tokio::test]
async fn headers_are_validated_once_per_request() {
    let validator = Counting::default();
    let mut app = App::new().with_validator(validator.clone()).unwrap();
    app.route(
        Method::GET,
        "/",
        |ctx: Context, res: ResponseBuilder| async move {
            for _ in 0..3 {
                ctx.headers()?;
            }
            res.text(ctx.headers()?["x-tenant"].as_str().unwrap_or_default().to_owned())
        },
        Validation::new().header("X-Tenant", Rule::Any),
    )
    .unwrap();

    let router = app.into_router().unwrap();
    let req = http::Request::get("/").header("x-tenant", "acme").body(Bytes::new()).unwrap();
    let response = router.handle(req).await.unwrap();
    assert_eq!(text(&response), "acme");
    assert_eq!(validator.calls(), 1);
}

#[tokio::test]
async fn repeated_query_keys_become_arrays() {
    let mut app = App::new().with_validator(Counting::default()).unwrap();
    app.route(
        Method::GET,
        "/search",
        |ctx: Context, res: ResponseBuilder| async move { res.json(ctx.query()?) },
        Validation::new().query("tag", Rule::Any),
    )
    .unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/search?tag=a&tag=b&q=x")).await.unwrap();
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body, json!({ "tag": ["a", "b"], "q": "x" }));
}

#[tokio::test]
async fn json_schema_body_validation() {
    let user = JsonSchema::new(json!({
        "type": "object",
        "required": ["name"],
        "properties": { "name": { "type": "string" } },
    }))
    .unwrap();

    let mut app = App::new();
    app.on_error(bad_request).unwrap();
    app.route(
        Method::POST,
        "/users",
        |ctx: Context, res: ResponseBuilder| async move {
            let user = ctx.body()?.clone();
            res.status(StatusCode::CREATED).json(&user)
        },
        Validation::new().body(BodySchema::json(user).required(true)),
    )
    .unwrap();

    let router = app.into_router().unwrap();
    let req = json_request(Method::POST, "/users", &json!({ "name": "ada" }));
    let created = router.handle(req).await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let req = json_request(Method::POST, "/users", &json!({ "age": 3 }));
    let rejected = router.handle(req).await.unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    assert_eq!(text(&rejected), "body.application/json");

    let missing = router.handle(request(Method::POST, "/users")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(text(&missing), "body");
}

#[tokio::test]
async fn invalid_outgoing_payload_fails_the_request() {
    let user = JsonSchema::new(json!({ "type": "object", "required": ["name"] })).unwrap();
    let mut app = App::new();
    app.route(
        Method::GET,
        "/user",
        |_: Context, res: ResponseBuilder| async move { res.json(&json!({ "id": 1 })) },
        RouteOptions::new().validation(Validation::new().response(200, ResponseSchema::json(user))),
    )
    .unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/user")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn raw_json_send_satisfies_a_json_response_schema() {
    let item = JsonSchema::new(json!({ "type": "object", "required": ["id"] })).unwrap();
    let mut app = App::new();
    app.route(
        Method::GET,
        "/item",
        |_: Context, res: ResponseBuilder| async move {
            res.send(ContentType::Json, r#"{"id":1}"#)
        },
        Validation::new().response(200, ResponseSchema::json(item)),
    )
    .unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/item")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(text(&response), r#"{"id":1}"#);
}

#[tokio::test]
async fn rejected_payload_leaves_no_content_type_for_error_handlers() {
    let mut app = App::new().with_validator(Counting::default()).unwrap();
    app.on_error(|_: DispatchError, _: Context, res: ResponseBuilder| async move {
        res.status(StatusCode::BAD_GATEWAY);
        Ok::<_, Error>(res.end())
    })
    .unwrap();
    app.route(
        Method::GET,
        "/greeting",
        |_: Context, res: ResponseBuilder| async move { res.text("hello") },
        Validation::new().response(200, ResponseSchema::new().content("text/plain", Rule::Reject)),
    )
    .unwrap();

    let router = app.into_router().unwrap();
    let response = router.handle(request(Method::GET, "/greeting")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.headers().get("content-type").is_none());
}

// ── Transport ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn router_serves_as_hyper_service() {
    let mut app = App::new();
    app.post("/echo", |ctx: Context, res: ResponseBuilder| async move {
        res.text(ctx.text().into_owned())
    })
    .unwrap();
    let router = app.into_router().unwrap();

    let req = http::Request::post("/echo").body(Full::new(Bytes::from_static(b"hello"))).unwrap();
    let response = router.call(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/plain; charset=utf-8");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"hello");
}
