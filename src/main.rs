#![forbid(unsafe_code)]

use lazy_static::lazy_static;
use log::{info, error};
use poem::listener::{BoxListener, Listener, RustlsCertificate, RustlsConfig};
use poem::{listener::TcpListener, Route};
use poem_openapi::OpenApiService;

// NMS Utilities
use crate::endpoints::hello::HelloApi;
use crate::endpoints::info::InfoApi;
use crate::utils::config::{create_nms_dirs, init_log, init_runtime_context, RuntimeCtx, CERT_FILE, KEY_FILE, NMS_ARGS, NMS_DIRS};
use crate::utils::errors::Errors;

// Modules
mod endpoints;
mod utils;

// ***************************************************************************
//                                Constants
// ***************************************************************************
const SERVER_NAME : &str = "NmsServer"; // for poem logging

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
// Lazily initialize the parameters variable so that is has a 'static lifetime.
// We exit if we can't read our parameters.
lazy_static! {
    static ref RUNTIME_CTX: RuntimeCtx = init_runtime_context();
}

// ---------------------------------------------------------------------------
// main:
// ---------------------------------------------------------------------------
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    // --------------- Initialize NMS -----------------
    // Announce ourselves.
    println!("Starting nms_server!");

    // Exit after creating the data directories if that's all that was asked.
    if NMS_ARGS.create_dirs_only {
        return match create_nms_dirs(&NMS_DIRS) {
            Ok(_) => {
                println!("NMS data directories created under {}.", NMS_DIRS.root_dir);
                Ok(())
            },
            Err(e) => Err(std::io::Error::other(e.to_string())),
        };
    }

    // Initialize the server.
    nms_init();

    // --------------- Main Loop Set Up ---------------
    // Assign base URL.
    let config = &RUNTIME_CTX.parms.config;
    let nms_url = format!("{}:{}", config.http_addr, config.http_port);
    let app = make_routes(&config.title, &nms_url);

    // Create the listener, which may or may not use TLS.
    let addr = format!("{}{}", "0.0.0.0:", config.http_port);
    let certs_dir = if config.enable_tls {Some(NMS_DIRS.certs_dir.as_str())} else {None};
    let listener = make_listener(addr, certs_dir)?;

    // ------------------ Main Loop -------------------
    info!("{} listening on {}.", SERVER_NAME, nms_url);
    poem::Server::new(listener)
        .name(SERVER_NAME)
        .run(app)
        .await
}

// ***************************************************************************
//                             Private Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// nms_init:
// ---------------------------------------------------------------------------
/** Initialing all subsystems and data structures other than those needed
 * to configure the main loop processor.
 */
fn nms_init() {
    // Configure out log.
    init_log();

    // Force the reading of input parameters and initialization of runtime context.
    info!("{}", Errors::InputParms(format!("{:#?}", *RUNTIME_CTX)));

    // Log build info.
    print_version_info();
}

// ---------------------------------------------------------------------------
// make_routes:
// ---------------------------------------------------------------------------
/** Assemble the api endpoints, their openapi documents and the swagger ui
 * into the application's routes.
 */
fn make_routes(title: &str, server_url: &str) -> Route {
    let endpoints = (HelloApi, InfoApi);
    let api_service =
        OpenApiService::new(endpoints, title, env!("CARGO_PKG_VERSION")).server(server_url);

    // Allow the generated openapi specs to be retrieved from the server.
    let spec = api_service.spec_endpoint();
    let spec_yaml = api_service.spec_endpoint_yaml();
    let ui = api_service.swagger_ui();

    Route::new()
        .at("/spec", spec)
        .at("/spec_yaml", spec_yaml)
        .nest("/docs", ui)
        .nest("/", api_service)
}

// ---------------------------------------------------------------------------
// make_listener:
// ---------------------------------------------------------------------------
/** Bind to the address, serving https when a certs directory is given.  The
 * certificate and key are read from that directory.
 */
fn make_listener(addr: String, certs_dir: Option<&str>) -> Result<BoxListener, std::io::Error> {
    let listener = TcpListener::bind(addr);
    let certs_dir = match certs_dir {
        Some(d) => d,
        None => return Ok(listener.boxed()),
    };

    let cert_file = certs_dir.to_string() + CERT_FILE;
    let key_file = certs_dir.to_string() + KEY_FILE;
    let cert = read_tls_file(&cert_file)?;
    let key = read_tls_file(&key_file)?;
    info!("TLS enabled using {} and {}.", cert_file, key_file);

    Ok(listener
        .rustls(RustlsConfig::new().fallback(RustlsCertificate::new().key(key).cert(cert)))
        .boxed())
}

// ---------------------------------------------------------------------------
// read_tls_file:
// ---------------------------------------------------------------------------
fn read_tls_file(path: &str) -> Result<Vec<u8>, std::io::Error> {
    std::fs::read(path).map_err(|e| {
        let msg = format!("{}: {}", Errors::TlsFiles(path.to_string()), e);
        error!("{}", msg);
        std::io::Error::new(e.kind(), msg)
    })
}

// ---------------------------------------------------------------------------
// print_version_info:
// ---------------------------------------------------------------------------
fn print_version_info() {
    // Log build info.
    info!("{}.", format!("\n*** Running NMS={}, BRANCH={}, COMMIT={}, DIRTY={}, SRC_TS={}, RUSTC={}",
                        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"),
                        env!("GIT_BRANCH"),
                        env!("GIT_COMMIT_SHORT"),
                        env!("GIT_DIRTY"),
                        env!("SOURCE_TIMESTAMP"),
                        env!("RUSTC_VERSION")),
    );
}
