use datashare_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    datashare_api::setup::init_tracing();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (storage, services, routes)
    let (state, router) = datashare_api::setup::initialize_app(config).await?;

    // Start the server
    datashare_api::setup::server::start_server(&state.config, router).await?;

    Ok(())
}
