use arlo_api::Result;
use arlo_client::ArloClient;
use tracing::info;

mod config;
mod entity;
mod notify;

// Initializes the `arlod` application. It determines the
// configuration and sets up the logger. It returns `Some(Config)`
// with the found configuration, if the application is to run. It
// returns `None` if the program should exit (because a command line
// option asked for the configuration to be displayed, for instance.)

async fn init_app() -> Option<config::Config> {
    // If a configuration is returned, set up the logger.

    if let Some(cfg) = config::get().await {
        // Initialize the log system. The max log level is determined
        // by the user (either through the config file or the command
        // line.)

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(cfg.get_log_level())
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("Unable to set global default subscriber");
        Some(cfg)
    } else {
        None
    }
}

// Runs the main body of the application: connect to the cloud, then
// surface devices until the session ends. A connection failure at
// setup is logged, recorded as a user-visible notification, and
// reported through the exit status; the daemon needs a restart once
// the cause is fixed.

async fn run() -> Result<()> {
    if let Some(cfg) = init_app().await {
        let opts = cfg.cloud.client_options()?;
        let storage_dir = opts.storage_dir.clone();

        match ArloClient::connect(opts).await {
            Ok(client) if client.is_connected() => {
                notify::clear(&storage_dir).await;
                info!("connected to {}", cfg.cloud.get_host());
                entity::run(client).await
            }

            Ok(_) => {
                let err = arlo_api::Error::OperationError(String::from(
                    "session didn't come up",
                ));

                notify::setup_failed(&storage_dir, &err).await;
                Err(err)
            }

            Err(err) => {
                notify::setup_failed(&storage_dir, &err).await;
                Err(err)
            }
        }
    } else {
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("ERROR: {}", e);
        std::process::exit(1)
    }
}
