use crate::app::dispatch::handle_tool;
use crate::app::lifecycle::context::StartupContext;
use crate::app::state::AppState;
use crate::core::pipeline::AsyncTask;
use actix_web::{App, HttpRequest, HttpServer, web};
use anyhow::{Error, anyhow, bail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

pub struct StartServerTask;

#[async_trait]
impl AsyncTask<StartupContext, Error> for StartServerTask {
    #[instrument(skip_all, name = "start_server_task")]
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = match context.config.get() {
            Some(config) => config,
            None => bail!("Config missing during start server task"),
        };

        let app_state: Arc<AppState> = context
            .app
            .get()
            .ok_or(anyhow!("App state not built before starting the server"))?
            .clone();

        let span_sample_rate = config.logging.span_sample_rate;
        let bind = (config.server.host.clone(), config.server.port);

        let server = HttpServer::new(move || {
            let state = app_state.clone();

            App::new()
                .route("/healthz", web::get().to(|| async { "ok" }))
                .route(
                    "/mcp/{tool}",
                    web::post().to({
                        move |tool: web::Path<String>, http_req: HttpRequest, body: web::Bytes| {
                            let state = state.clone();
                            async move {
                                handle_tool(state, tool.into_inner(), http_req, body, span_sample_rate).await
                            }
                        }
                    }),
                )
        })
        .bind(bind)?
        .run();

        context
            .server
            .set(server.handle())
            .map_err(|_| anyhow!("Could not set server handle"))?;

        tokio::spawn(server);

        info!("Started http server, ready for requests");

        Ok(())
    }
}
