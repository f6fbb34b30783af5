use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use circlelink_app::client::{CircleClient, Collaborators};
use circlelink_app::config::Config;
use circlelink_app::logging::init_logging;
use circlelink_app::sensors::{SimulatedBatterySensor, SimulatedPositioningSensor};
use circlelink_app::services::{next_notice, FileSessionStorage};
use circlelink_app::shell::{self, Outcome, ShellError};
use domain::services::alert::MockAlertBroadcaster;
use persistence::store::InMemoryDocumentStore;

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "circlelink> ")?;
    stdout.flush()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting CircleLink v{}", env!("CARGO_PKG_VERSION"));

    let client = CircleClient::connect(
        &config,
        Collaborators {
            store: Arc::new(InMemoryDocumentStore::new()),
            session_storage: Arc::new(FileSessionStorage::new(&config.session.storage_path)),
            positioning: Arc::new(SimulatedPositioningSensor::default()),
            battery: Arc::new(SimulatedBatterySensor::default()),
            alerts: Arc::new(MockAlertBroadcaster::new()),
        },
    )
    .await;

    // Print notices as they are posted
    let mut notices = client.notices().subscribe();
    tokio::spawn(async move {
        while let Some(notice) = next_notice(&mut notices).await {
            println!("\n[{}] {}", notice.title, notice.message);
        }
    });

    println!("{}", shell::HELP);
    prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match shell::parse(&line) {
            Ok(command) => match shell::execute(&client, command).await {
                Ok(Outcome::Quit) => break,
                Ok(Outcome::Continue(text)) => println!("{}", text),
                Err(e) => println!("error: {}", e),
            },
            Err(ShellError::Empty) => {}
            Err(e) => println!("{}", e),
        }
        prompt()?;
    }

    client.stop_tracking();
    client.sos().cancel();
    info!("CircleLink shut down");

    Ok(())
}
