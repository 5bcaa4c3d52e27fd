//! Creator Fetch CLI - command line frontend for the download pipeline

use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use creator_fetch_core::{
    init_database, CancellationGateway, Database, DownloadRecord, DownloadRecordsDb,
    DownloadRequest, DownloadService, GoshDlEngine, JobSubmitter, MediaKind, PipelineCommand,
    Result, Settings, SettingsDb, StatusPoller, UiMessage,
};

#[derive(Parser)]
#[command(name = "creator-fetch", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a file for download
    Add {
        url: String,
        /// Display name of the file
        #[arg(short, long)]
        name: String,
        #[arg(long, default_value = "")]
        post_id: String,
        #[arg(long, default_value = "")]
        post_title: String,
        #[arg(long, default_value = "")]
        creator_id: String,
        #[arg(long, default_value = "")]
        creator_name: String,
        /// Sub-folder used instead of the post title
        #[arg(short, long)]
        group: Option<String>,
        /// Force the media kind (image or video)
        #[arg(long)]
        kind: Option<String>,
    },
    /// List recorded downloads
    List {
        /// Only show records whose file or creator name matches
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show the current status of a download
    Status { id: i64 },
    /// Follow the progress of all in-flight downloads
    Watch,
    /// Cancel and delete a download record
    Delete { id: i64 },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Save downloads under a custom root
    SetRoot { root: String },
    /// Go back to the platform downloads folder
    ClearRoot,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command).await {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(command: Commands) -> Result<()> {
    let db = init_database()?;
    let settings = SettingsDb::load(&db).unwrap_or_else(|e| {
        log::warn!("Failed to load settings, using defaults: {}", e);
        Settings::default()
    });

    match command {
        Commands::Add {
            url,
            name,
            post_id,
            post_title,
            creator_id,
            creator_name,
            group,
            kind,
        } => {
            let engine = Arc::new(GoshDlEngine::start(&settings).await?);
            let submitter = JobSubmitter::new(engine, Arc::new(db.clone()), db);

            let mut request = DownloadRequest::new(url, name)
                .post(post_id, post_title)
                .creator(creator_id, creator_name);
            if let Some(group) = group {
                request = request.grouping_hint(group);
            }
            if let Some(kind) = kind {
                request = request.media_kind(MediaKind::from(kind.as_str()));
            }

            let record = submitter.submit(request).await?;
            println!("Queued #{} -> {}", record.id, record.resolved_path);
        }

        Commands::List { search, json } => {
            let records = match search {
                Some(query) => DownloadRecordsDb::search(&db, &query)?,
                None => DownloadRecordsDb::list(&db)?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    print_record(record);
                }
            }
        }

        Commands::Status { id } => {
            let record = find_record(&db, id)?;
            let engine = Arc::new(GoshDlEngine::start(&settings).await?);
            let status = StatusPoller::new(engine).poll_record(&record).await;
            println!(
                "#{} {} {:.0}%",
                record.id,
                status.phase,
                status.progress * 100.0
            );
        }

        Commands::Watch => watch(db, settings).await?,

        Commands::Delete { id } => {
            let record = find_record(&db, id)?;
            let engine = Arc::new(GoshDlEngine::start(&settings).await?);
            CancellationGateway::new(engine, db).delete_record(&record).await?;
            println!("Deleted #{}", id);
        }

        Commands::Config { action } => {
            match action {
                Some(ConfigAction::SetRoot { root }) => {
                    let settings = Settings {
                        destination_root: Some(root),
                        ..settings
                    };
                    SettingsDb::save(&db, &settings)?;
                }
                Some(ConfigAction::ClearRoot) => {
                    let settings = Settings {
                        destination_root: None,
                        ..settings
                    };
                    SettingsDb::save(&db, &settings)?;
                }
                None => {}
            }
            println!("{}", serde_json::to_string_pretty(&SettingsDb::load(&db)?)?);
        }
    }

    Ok(())
}

/// Run the download service and print its messages until Ctrl-C
async fn watch(db: Database, settings: Settings) -> Result<()> {
    let engine = Arc::new(GoshDlEngine::start(&settings).await?);
    let service = DownloadService::new(engine, Arc::new(db.clone()), db, &settings);

    let (ui_sender, ui_receiver) = async_channel::bounded::<UiMessage>(100);
    let (cmd_sender, cmd_receiver) = async_channel::bounded::<PipelineCommand>(100);

    let service_handle = tokio::spawn(service.run(ui_sender, cmd_receiver));
    cmd_sender.send(PipelineCommand::RefreshRecords).await?;

    loop {
        tokio::select! {
            msg = ui_receiver.recv() => {
                match msg {
                    Ok(msg) => print_message(msg),
                    Err(_) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping");
                cmd_sender.send(PipelineCommand::Shutdown).await?;
                break;
            }
        }
    }

    if let Err(e) = service_handle.await {
        log::error!("Download service task failed: {}", e);
    }
    Ok(())
}

fn find_record(db: &Database, id: i64) -> Result<DownloadRecord> {
    DownloadRecordsDb::get(db, id)?
        .ok_or_else(|| creator_fetch_core::Error::NotFound(format!("download #{}", id)))
}

fn print_record(record: &DownloadRecord) {
    println!(
        "#{:<5} {:<6} {:<20} {} ({})",
        record.id,
        record.media_kind.to_string(),
        record.creator_name,
        record.file_name,
        record.resolved_path
    );
}

fn print_message(msg: UiMessage) {
    match msg {
        UiMessage::Ready => println!("Watching downloads, Ctrl-C to stop"),
        UiMessage::RecordsList(records) => records.iter().for_each(print_record),
        UiMessage::RecordAdded(record) | UiMessage::RecordUpdated(record) => print_record(&record),
        UiMessage::RecordRemoved(id) => println!("#{} removed", id),
        UiMessage::StatusUpdated { record_id, status } => {
            println!(
                "#{} {} {:.0}%",
                record_id,
                status.phase,
                status.progress * 100.0
            );
        }
        UiMessage::StatusUnknown(id) => println!("#{} status unknown", id),
        UiMessage::Error(e) => eprintln!("Error: {}", e),
    }
}
