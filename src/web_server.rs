use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::config::ServerConfig;
use crate::pipeline::Pipeline;
use crate::routes::{json_error_handler, judge_submission_handler};

/// Seconds in-flight submissions get to finish once shutdown starts
const SHUTDOWN_TIMEOUT: u64 = 5;

pub fn build_server(server_config: ServerConfig, pipeline: Pipeline) -> std::io::Result<Server> {
    let pipeline = web::Data::new(pipeline);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(pipeline.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .service(judge_submission_handler)
    })
    .shutdown_timeout(SHUTDOWN_TIMEOUT)
    .bind(server_config.address())?
    .run();

    Ok(server)
}
