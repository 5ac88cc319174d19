mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod monitoring;

use tracing_subscriber::prelude::*;
use tracing_web::MakeWebConsoleWriter;
use worker::*;

use crate::config::Config;

/// Adapts an `ApiResult` handler to the router, rendering errors as JSON.
macro_rules! api {
    ($handler:path) => {
        |req, ctx| async move { error::finish($handler(req, ctx).await) }
    };
}

#[event(start)]
fn start() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .without_time()
        .with_writer(MakeWebConsoleWriter::new());
    tracing_subscriber::registry().with(fmt_layer).init();
}

#[event(fetch)]
async fn main(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    let config = Config::load(&env);
    tracing::info!(method = ?req.method(), path = %req.path(), "request");
    tracing::debug!(
        environment = %config.environment,
        public_api_url = config.public_api_url.as_deref().unwrap_or("-"),
        "config loaded"
    );

    let cors = Cors::default()
        .with_origins(vec![config.cors_origin.clone()])
        .with_methods(vec![
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Options,
        ])
        .with_allowed_headers(vec!["Content-Type", "Authorization", auth::ADMIN_KEY_HEADER])
        .with_max_age(3600);

    Router::with_data(config)
        .options("/api/*path", |_, _| Response::empty())
        .get("/", |_, _| Response::ok("Cafe admin API OK"))
        // session
        .post_async("/api/auth/login", api!(handlers::auth::login))
        .post_async("/api/auth/logout", api!(handlers::auth::logout))
        .get_async("/api/auth/session", api!(handlers::auth::session))
        // catalog
        .get_async("/api/products", api!(handlers::products::list_products))
        .post_async("/api/products", api!(handlers::products::create_product))
        .get_async("/api/products/:id", api!(handlers::products::get_product))
        .put_async("/api/products/:id", api!(handlers::products::update_product))
        .delete_async("/api/products/:id", api!(handlers::products::delete_product))
        .get_async("/api/categories", api!(handlers::categories::list_categories))
        .post_async("/api/categories", api!(handlers::categories::create_category))
        .get_async("/api/categories/:id", api!(handlers::categories::get_category))
        .put_async("/api/categories/:id", api!(handlers::categories::update_category))
        .delete_async("/api/categories/:id", api!(handlers::categories::delete_category))
        .get_async("/api/toppings", api!(handlers::toppings::list_toppings))
        .post_async("/api/toppings", api!(handlers::toppings::create_topping))
        .get_async("/api/toppings/:id", api!(handlers::toppings::get_topping))
        .put_async("/api/toppings/:id", api!(handlers::toppings::update_topping))
        .delete_async("/api/toppings/:id", api!(handlers::toppings::delete_topping))
        .get_async("/api/events", api!(handlers::events::list_events))
        .post_async("/api/events", api!(handlers::events::create_event))
        .get_async("/api/events/:id", api!(handlers::events::get_event))
        .put_async("/api/events/:id", api!(handlers::events::update_event))
        .delete_async("/api/events/:id", api!(handlers::events::delete_event))
        .get_async("/api/vouchers", api!(handlers::vouchers::list_vouchers))
        .post_async("/api/vouchers", api!(handlers::vouchers::create_voucher))
        .get_async("/api/vouchers/:code", api!(handlers::vouchers::get_voucher))
        .put_async("/api/vouchers/:code", api!(handlers::vouchers::update_voucher))
        .delete_async("/api/vouchers/:code", api!(handlers::vouchers::delete_voucher))
        .get_async("/api/rewards", api!(handlers::rewards::list_rewards))
        .post_async("/api/rewards", api!(handlers::rewards::create_reward))
        .get_async("/api/rewards/:id", api!(handlers::rewards::get_reward))
        .put_async("/api/rewards/:id", api!(handlers::rewards::update_reward))
        .delete_async("/api/rewards/:id", api!(handlers::rewards::delete_reward))
        .get_async("/api/stores", api!(handlers::stores::list_stores))
        .post_async("/api/stores", api!(handlers::stores::create_store))
        .get_async("/api/stores/:id", api!(handlers::stores::get_store))
        .put_async("/api/stores/:id", api!(handlers::stores::update_store))
        .delete_async("/api/stores/:id", api!(handlers::stores::delete_store))
        // admin
        .get_async("/api/admin/delivery-zones", api!(handlers::delivery_zones::list_zones))
        .post_async("/api/admin/delivery-zones", api!(handlers::delivery_zones::create_zone))
        .put_async("/api/admin/delivery-zones", api!(handlers::delivery_zones::update_zone))
        .delete_async("/api/admin/delivery-zones", api!(handlers::delivery_zones::delete_zone))
        .get_async(
            "/api/admin/products/delivery-settings",
            api!(handlers::delivery_settings::list_delivery_settings),
        )
        .put_async(
            "/api/admin/products/delivery-settings",
            api!(handlers::delivery_settings::update_delivery_settings),
        )
        .get_async("/api/admin/reports", api!(handlers::reports::list_reports))
        .put_async("/api/admin/reports", api!(handlers::reports::review_report))
        .get_async("/api/admin/config", api!(handlers::system_config::list_config))
        .put_async("/api/admin/config", api!(handlers::system_config::update_config))
        .get_async("/api/admin/monitoring/dashboard", api!(handlers::monitoring::dashboard))
        .run(req, env)
        .await?
        .with_cors(&cors)
}
