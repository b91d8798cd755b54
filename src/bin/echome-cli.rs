//! echome-cli: submit and follow jobs against a running server.

use clap::{Parser, Subcommand};
use reqwest::{multipart, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use echome::auth::{issue_session_token, AuthError, SessionClaims};
use echome::models::job::Job;
use echome::models::requests::{JobResponse, ProductUploadResponse, SubmitResponse};
use echome::tracker::{poll_until_settled, JobTracker, TrackedStatus, POLL_INTERVAL};

#[derive(Parser)]
#[command(name = "echome-cli")]
#[command(version, about = "Submit and follow EchoMe jobs", long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(long, global = true, env = "ECHOME_URL", default_value = "http://localhost:3000")]
    server: String,

    /// Session token sent as a Bearer token
    #[arg(long, global = true, env = "ECHOME_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a session token for local use
    Token {
        /// Email address of the user
        email: String,

        #[arg(long)]
        name: Option<String>,

        /// Secret shared with the server
        #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
        secret: String,

        /// Token lifetime in hours
        #[arg(long, default_value = "24")]
        ttl_hours: i64,
    },

    /// Queue audio extraction from a YouTube video
    Extract {
        /// YouTube video URL
        url: String,

        #[arg(short, long)]
        persona: String,

        /// Follow the job until it settles
        #[arg(short, long)]
        watch: bool,
    },

    /// Queue voice cloning
    Clone {
        #[arg(short, long)]
        persona: String,

        /// YouTube video URL
        #[arg(long, conflicts_with = "extract_job")]
        url: Option<String>,

        /// Completed extraction job whose audio should be cloned
        #[arg(long)]
        extract_job: Option<Uuid>,

        /// Follow the job until it settles
        #[arg(short, long)]
        watch: bool,
    },

    /// Upload a product document for ingestion
    Upload {
        /// Path to the document
        path: PathBuf,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Follow the ingestion job until it settles
        #[arg(short, long)]
        watch: bool,
    },

    /// Print a job as stored
    Status { job_id: Uuid },

    /// Poll a job every few seconds until it completes or fails
    Watch { job_id: Uuid },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("No session token; set ECHOME_TOKEN or pass --token")]
    MissingToken,

    #[error("{status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Job {0} failed")]
    JobFailed(Uuid),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, CliError>;

struct ApiClient {
    http: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or(CliError::MissingToken)?;
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        let response = self
            .http
            .get(self.url(&format!("/voice/jobs/{job_id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body: JobResponse = decode(response).await?;
        Ok(body.job)
    }

    async fn upload(
        &self,
        path: &Path,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<ProductUploadResponse> {
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mut form =
            multipart::Form::new().part("file", multipart::Part::bytes(data).file_name(filename));
        if let Some(name) = name {
            form = form.text("name", name);
        }
        if let Some(description) = description {
            form = form.text("description", description);
        }

        let response = self
            .http
            .post(self.url("/products/upload"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }
}

/// Decode a success body, or turn an `{"error": ..}` body into [`CliError::Api`].
async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(text);
    Err(CliError::Api { status, message })
}

/// Submit through `submit`, then optionally follow the job to completion.
async fn submit_and_follow<F>(client: &ApiClient, watch: bool, submit: F) -> Result<()>
where
    F: std::future::Future<Output = Result<Uuid>>,
{
    let mut tracker = JobTracker::new();
    tracker.begin_submission();

    match submit.await {
        Ok(job_id) => tracker.submission_accepted(job_id),
        Err(e) => {
            tracker.submission_rejected(e.to_string());
            return Err(e);
        }
    }

    if watch {
        follow(client, tracker).await
    } else {
        Ok(())
    }
}

async fn follow(client: &ApiClient, mut tracker: JobTracker) -> Result<()> {
    let Some(job_id) = tracker.job_id() else {
        return Ok(());
    };
    println!("{job_id}: {}", tracker.status());

    let status = poll_until_settled(
        &mut tracker,
        POLL_INTERVAL,
        |id| client.get_job(id),
        |t| println!("{job_id}: {}", t.status()),
    )
    .await;

    match status {
        TrackedStatus::Completed => {
            if let Some(produced) = tracker.produced() {
                println!("{produced}");
            }
            Ok(())
        }
        _ => {
            if let Some(error) = tracker.error() {
                eprintln!("{error}");
            }
            Err(CliError::JobFailed(job_id))
        }
    }
}

/// Sign a session token the server will accept for `email`.
fn session_token(email: String, name: Option<String>, secret: &str, ttl_hours: i64) -> Result<String> {
    let claims = SessionClaims {
        sub: email,
        name,
        picture: None,
        exp: chrono::Utc::now().timestamp() + ttl_hours * 3600,
    };
    Ok(issue_session_token(secret, &claims)?)
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Token {
            email,
            name,
            secret,
            ttl_hours,
        } => println!("{}", session_token(email, name, &secret, ttl_hours)?),

        Commands::Extract {
            url,
            persona,
            watch,
        } => {
            let client = ApiClient::new(&cli.server, cli.token)?;
            submit_and_follow(&client, watch, async {
                let response: SubmitResponse = client
                    .post_json(
                        "/voice/extract",
                        &json!({ "youtube_url": url, "persona_name": persona }),
                    )
                    .await?;
                println!("{} {}", response.job_id, response.message);
                Ok(response.job_id)
            })
            .await?;
        }

        Commands::Clone {
            persona,
            url,
            extract_job,
            watch,
        } => {
            let client = ApiClient::new(&cli.server, cli.token)?;
            submit_and_follow(&client, watch, async {
                let response: SubmitResponse = client
                    .post_json(
                        "/voice/clone",
                        &json!({
                            "persona_name": persona,
                            "youtube_url": url,
                            "extract_job_id": extract_job,
                        }),
                    )
                    .await?;
                println!("{} {}", response.job_id, response.message);
                Ok(response.job_id)
            })
            .await?;
        }

        Commands::Upload {
            path,
            name,
            description,
            watch,
        } => {
            let client = ApiClient::new(&cli.server, cli.token)?;
            submit_and_follow(&client, watch, async {
                let response = client.upload(&path, name, description).await?;
                println!(
                    "{} product {} {}",
                    response.job_id, response.product_id, response.message
                );
                Ok(response.job_id)
            })
            .await?;
        }

        Commands::Status { job_id } => {
            let client = ApiClient::new(&cli.server, cli.token)?;
            let job = client.get_job(job_id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }

        Commands::Watch { job_id } => {
            let client = ApiClient::new(&cli.server, cli.token)?;
            let mut tracker = JobTracker::new();
            tracker.submission_accepted(job_id);
            follow(&client, tracker).await?;
        }
    }

    Ok(())
}
