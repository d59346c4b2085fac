use clap::{Arg, ArgAction, Command};
use etl::RunOptions;
use etl::pipeline::{DEFAULT_CONFIG_PATH, DEFAULT_LOG_PATH};
use std::path::PathBuf;
use std::process;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let matches = Command::new("ETL Pipeline Manager")
        .version("1.0")
        .about("Loads the listings CSV into PostgreSQL, raw and transformed")
        .subcommand(
            Command::new("etl")
                .about("Run the ETL pipeline")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("log-file")
                        .short('l')
                        .long("log-file")
                        .value_name("FILE")
                        .help("Where to write the run log"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Run every step against an in-memory sink"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("etl", etl_matches)) => {
            let options = RunOptions {
                config_path: etl_matches
                    .get_one::<String>("config")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()),
                log_file: etl_matches
                    .get_one::<String>("log-file")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
                dry_run: etl_matches.get_flag("dry-run"),
            };
            println!("Starting ETL pipeline with config: {}", options.config_path);

            match etl::run_etl_pipeline(&options).await {
                Ok(report) => match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(_) => println!("{:?}", report),
                },
                Err(e) => {
                    eprintln!("ETL pipeline error: {}", e);
                    process::exit(1);
                }
            }
        }

        _ => {
            eprintln!("Please specify a valid subcommand");
            process::exit(1);
        }
    }
}
