pub mod api;

use std::sync::Arc;

use actix_web::{App, HttpServer, web::Data};

use crate::oui::OuiCache;

/// Run the JSON API until the server is shut down.
pub async fn serve(cache: Arc<OuiCache>, bind: &str) -> std::io::Result<()> {
    tracing::info!(%bind, "Starting web server");
    let cache = Data::from(cache);

    HttpServer::new(move || App::new().app_data(cache.clone()).configure(api::configure))
        .bind(bind)?
        .run()
        .await
}
