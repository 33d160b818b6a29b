use std::net::SocketAddr;

use axum::{routing, Router};
use tourbook::app::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tourbook=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_state = AppState::new_from_env().await.unwrap();
    app_state.run_migration().await.unwrap();

    let api = Router::new().nest(
        "/v1",
        Router::new()
            .nest(
                "/users",
                Router::new()
                    .route("/signup", routing::post(tourbook::api::v1::auth::signup))
                    .route("/login", routing::post(tourbook::api::v1::auth::login))
                    .route("/logout", routing::post(tourbook::api::v1::auth::logout))
                    .route(
                        "/forgot-password",
                        routing::post(tourbook::api::v1::auth::forgot_password),
                    )
                    .route(
                        "/reset-password/:token",
                        routing::patch(tourbook::api::v1::auth::reset_password),
                    )
                    .route("/me", routing::get(tourbook::api::v1::user::get_me))
                    .route(
                        "/update-me",
                        routing::patch(tourbook::api::v1::user::update_me),
                    )
                    .route(
                        "/me/photo",
                        routing::post(tourbook::api::v1::user::upload_my_photo),
                    )
                    .route(
                        "/update-my-password",
                        routing::patch(tourbook::api::v1::user::update_my_password),
                    )
                    .route(
                        "/delete-me",
                        routing::delete(tourbook::api::v1::user::delete_me),
                    )
                    .route("/", routing::get(tourbook::api::v1::user::index))
                    .route("/", routing::post(tourbook::api::v1::user::create))
                    .route("/:id", routing::get(tourbook::api::v1::user::show))
                    .route("/:id", routing::patch(tourbook::api::v1::user::update))
                    .route("/:id", routing::delete(tourbook::api::v1::user::delete)),
            )
            .nest(
                "/tours",
                Router::new()
                    .route("/", routing::get(tourbook::api::v1::tour::index))
                    .route("/", routing::post(tourbook::api::v1::tour::create))
                    .route(
                        "/tour-stats",
                        routing::get(tourbook::api::v1::tour::tour_stats),
                    )
                    .route(
                        "/monthly-plans/:year",
                        routing::get(tourbook::api::v1::tour::monthly_plan),
                    )
                    .route(
                        "/tours-within/:distance/center/:latlng",
                        routing::get(tourbook::api::v1::tour::tours_within),
                    )
                    .route(
                        "/distances/:latlng",
                        routing::get(tourbook::api::v1::tour::distances),
                    )
                    .route(
                        "/tour/:slug",
                        routing::get(tourbook::api::v1::tour::show_by_slug),
                    )
                    .route("/:id", routing::get(tourbook::api::v1::tour::show))
                    .route("/:id", routing::patch(tourbook::api::v1::tour::update))
                    .route("/:id", routing::delete(tourbook::api::v1::tour::delete))
                    .route(
                        "/:id/images",
                        routing::post(tourbook::api::v1::tour::upload_images),
                    )
                    .route(
                        "/:id/reviews",
                        routing::get(tourbook::api::v1::review::index_for_tour),
                    )
                    .route(
                        "/:id/reviews",
                        routing::post(tourbook::api::v1::review::create),
                    ),
            )
            .nest(
                "/reviews",
                Router::new()
                    .route("/", routing::get(tourbook::api::v1::review::index))
                    .route("/:id", routing::get(tourbook::api::v1::review::show))
                    .route("/:id", routing::patch(tourbook::api::v1::review::update))
                    .route("/:id", routing::delete(tourbook::api::v1::review::delete)),
            )
            .nest(
                "/bookings",
                Router::new()
                    .route("/key", routing::get(tourbook::api::v1::booking::get_key))
                    .route(
                        "/checkout",
                        routing::post(tourbook::api::v1::booking::checkout),
                    )
                    .route(
                        "/callback",
                        routing::post(tourbook::api::v1::booking::callback),
                    )
                    .route("/", routing::get(tourbook::api::v1::booking::index))
                    .route("/", routing::post(tourbook::api::v1::booking::create))
                    .route(
                        "/user/:id",
                        routing::get(tourbook::api::v1::booking::index_for_user),
                    )
                    .route("/:id", routing::get(tourbook::api::v1::booking::show))
                    .route("/:id", routing::patch(tourbook::api::v1::booking::update))
                    .route("/:id", routing::delete(tourbook::api::v1::booking::delete)),
            ),
    );

    let app = Router::new()
        .nest("/api", api)
        .nest_service("/", tower_http::services::fs::ServeDir::new("public"))
        .with_state(app_state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(8000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::debug!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
