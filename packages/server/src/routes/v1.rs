use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(product_routes())
        .merge(inventory_routes())
        .merge(maintenance_routes())
}

fn product_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::product::list_products))
        .routes(routes!(
            handlers::product::get_product,
            handlers::product::update_product,
            handlers::product::delete_product
        ))
}

fn inventory_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::inventory::list_inventory_logs))
        .routes(routes!(handlers::inventory::list_product_inventory_logs))
}

fn maintenance_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::maintenance::sweep_orphan_files))
        .routes(routes!(handlers::maintenance::sweep_orphan_records))
        .routes(routes!(handlers::maintenance::recover_pending_audits))
}
