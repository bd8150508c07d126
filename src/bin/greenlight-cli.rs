use clap::{Parser, Subcommand};
use greenlight_sdk::{ClientError, GreenlightClient, ListParams, MoviePatch, NewMovie, NewUser};
use serde_json::json;

#[derive(Parser)]
#[command(name = "greenlight-cli")]
#[command(about = "Command line client for the Greenlight API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:4000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server status
    Health,
    /// List movies
    List {
        #[arg(long)]
        title: Option<String>,
        /// Comma separated genres; every one must match
        #[arg(long)]
        genres: Option<String>,
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        page_size: Option<i64>,
        #[arg(long)]
        sort: Option<String>,
    },
    /// Show one movie
    Show { id: i64 },
    /// Add a movie
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        year: i32,
        /// Minutes
        #[arg(long)]
        runtime: i32,
        #[arg(long, value_delimiter = ',')]
        genres: Vec<String>,
    },
    /// Change some fields of a movie
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        runtime: Option<i32>,
        #[arg(long, value_delimiter = ',')]
        genres: Option<Vec<String>>,
        /// Refuse the update if the movie changed since this version
        #[arg(long)]
        expected_version: Option<i32>,
    },
    /// Remove a movie
    Delete { id: i64 },
    /// Register a user
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = GreenlightClient::new(&cli.url);

    let result = match cli.command {
        Commands::Health => client.healthcheck().await.map(|health| {
            json!({
                "status": health.status,
                "environment": health.system_info.environment,
                "version": health.system_info.version,
            })
        }),
        Commands::List {
            title,
            genres,
            page,
            page_size,
            sort,
        } => {
            let params = ListParams {
                title,
                genres,
                page,
                page_size,
                sort,
            };
            client.list_movies(&params).await.map(|list| {
                json!({
                    "movies": list.movies.iter().map(|m| json!({
                        "id": m.id,
                        "title": m.title,
                        "year": m.year,
                        "runtime": m.runtime,
                        "genres": m.genres,
                        "version": m.version,
                    })).collect::<Vec<_>>(),
                    "total_records": list.metadata.total_records,
                    "last_page": list.metadata.last_page,
                })
            })
        }
        Commands::Show { id } => client.get_movie(id).await.map(|m| {
            json!({ "id": m.id, "title": m.title, "year": m.year, "runtime": m.runtime, "genres": m.genres, "version": m.version })
        }),
        Commands::Create {
            title,
            year,
            runtime,
            genres,
        } => {
            let movie = NewMovie {
                title,
                year,
                runtime: format!("{runtime} mins"),
                genres,
            };
            client.create_movie(&movie).await.map(|m| json!({ "id": m.id, "version": m.version }))
        }
        Commands::Update {
            id,
            title,
            year,
            runtime,
            genres,
            expected_version,
        } => {
            let patch = MoviePatch {
                title,
                year,
                runtime: runtime.map(|minutes| format!("{minutes} mins")),
                genres,
            };
            client
                .update_movie(id, &patch, expected_version)
                .await
                .map(|m| json!({ "id": m.id, "version": m.version }))
        }
        Commands::Delete { id } => client
            .delete_movie(id)
            .await
            .map(|()| json!({ "message": "movie successfully deleted" })),
        Commands::Register { name, email } => client
            .register_user(&NewUser { name, email })
            .await
            .map(|u| json!({ "id": u.id, "email": u.email, "activated": u.activated })),
    };

    match result {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(ClientError::Api { status, error }) => {
            eprintln!("Error: server returned status {status}");
            eprintln!("{}", serde_json::to_string_pretty(&error)?);
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
    Ok(())
}
