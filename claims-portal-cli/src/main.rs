use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use claims_portal_client::{
    BackendApi, ClaimOrchestrator, ClaimRequest, ClientError, DocumentType, HttpBackend,
    JobTracker, SessionContext, TreatmentType, UploadDispatcher, UploadFile,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "claims-portal", version, about = "Insurance claims portal client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload documents and follow their processing to completion
    Upload {
        files: Vec<PathBuf>,
        #[arg(long, value_enum, default_value_t = DocTypeArg::Other)]
        doc_type: DocTypeArg,
    },
    /// List previously uploaded documents
    Documents,
    /// Submit a claim and print the decision
    Submit {
        #[arg(long)]
        policy_id: String,
        #[arg(long, value_enum)]
        treatment_type: TreatmentArg,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        hospital: Option<String>,
        /// Treatment date as DD/MM/YYYY
        #[arg(long)]
        treatment_date: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Also fetch the detailed decision explanation
        #[arg(long)]
        explain: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DocTypeArg {
    Policy,
    ClaimForm,
    HospitalBill,
    SurveyorReport,
    DischargeSummary,
    Fir,
    Photo,
    Other,
}

impl From<DocTypeArg> for DocumentType {
    fn from(value: DocTypeArg) -> Self {
        match value {
            DocTypeArg::Policy => DocumentType::Policy,
            DocTypeArg::ClaimForm => DocumentType::ClaimForm,
            DocTypeArg::HospitalBill => DocumentType::HospitalBill,
            DocTypeArg::SurveyorReport => DocumentType::SurveyorReport,
            DocTypeArg::DischargeSummary => DocumentType::DischargeSummary,
            DocTypeArg::Fir => DocumentType::Fir,
            DocTypeArg::Photo => DocumentType::Photo,
            DocTypeArg::Other => DocumentType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TreatmentArg {
    Appendicitis,
    Cardiac,
    Orthopedic,
    Dental,
    Maternity,
    Accident,
    GeneralSurgery,
    Hospitalization,
    Other,
}

impl From<TreatmentArg> for TreatmentType {
    fn from(value: TreatmentArg) -> Self {
        match value {
            TreatmentArg::Appendicitis => TreatmentType::Appendicitis,
            TreatmentArg::Cardiac => TreatmentType::Cardiac,
            TreatmentArg::Orthopedic => TreatmentType::Orthopedic,
            TreatmentArg::Dental => TreatmentType::Dental,
            TreatmentArg::Maternity => TreatmentType::Maternity,
            TreatmentArg::Accident => TreatmentType::Accident,
            TreatmentArg::GeneralSurgery => TreatmentType::GeneralSurgery,
            TreatmentArg::Hospitalization => TreatmentType::Hospitalization,
            TreatmentArg::Other => TreatmentType::Other,
        }
    }
}

struct PortalConfig {
    base_url: String,
    token: Option<String>,
    poll_interval: Duration,
    submit_deadline: Duration,
}

impl PortalConfig {
    fn from_env() -> Self {
        let base_url = std::env::var("CLAIMS_BACKEND_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let token = std::env::var("CLAIMS_API_TOKEN").ok().filter(|t| !t.is_empty());
        let poll_interval_ms = std::env::var("CLAIMS_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (100..=60_000).contains(v))
            .unwrap_or(2_000);
        let submit_deadline_secs = std::env::var("CLAIMS_SUBMIT_DEADLINE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (1..=600).contains(v))
            .unwrap_or(60);
        Self {
            base_url,
            token,
            poll_interval: Duration::from_millis(poll_interval_ms),
            submit_deadline: Duration::from_secs(submit_deadline_secs),
        }
    }
}

/// Initialize tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "claims_portal_cli=info,claims_portal_client=info".into());

    match log_format.as_str() {
        "json" => {
            // Structured JSON logging for scripted runs
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
        _ => {
            // Human-readable logging for interactive use
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = PortalConfig::from_env();

    let session = match &config.token {
        Some(token) => SessionContext::with_token(token.clone()),
        None => SessionContext::anonymous(),
    };
    let api = Arc::new(HttpBackend::new(&config.base_url, session));
    info!(backend = %config.base_url, "claims portal client starting");

    match cli.command {
        Commands::Upload { files, doc_type } => upload(api, &config, files, doc_type.into()).await,
        Commands::Documents => list_documents(api).await,
        Commands::Submit {
            policy_id,
            treatment_type,
            amount,
            hospital,
            treatment_date,
            description,
            explain,
        } => {
            let treatment_date = treatment_date
                .map(|raw| {
                    NaiveDate::parse_from_str(&raw, "%d/%m/%Y")
                        .with_context(|| format!("treatment date must be DD/MM/YYYY, got {raw}"))
                })
                .transpose()?;
            let request = ClaimRequest {
                policy_id,
                treatment_type: treatment_type.into(),
                claimed_amount: amount,
                hospital_name: hospital,
                treatment_date,
                description,
            };
            submit(api, &config, request, explain).await
        }
    }
}

async fn upload(
    api: Arc<HttpBackend>,
    config: &PortalConfig,
    files: Vec<PathBuf>,
    doc_type: DocumentType,
) -> anyhow::Result<()> {
    if files.is_empty() {
        bail!("no files given");
    }

    let (tracker, mut events) = JobTracker::with_poll_interval(api.clone(), config.poll_interval);
    let dispatcher = UploadDispatcher::new(api, tracker.clone());

    let mut batch = Vec::with_capacity(files.len());
    for path in &files {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("not a file path: {}", path.display()))?;
        let content =
            std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
        batch.push(UploadFile {
            file_name,
            doc_type,
            content,
        });
    }

    let outcomes = dispatcher.dispatch(batch).await;
    let mut pending = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(doc_id) => {
                println!("{}: uploaded as {doc_id}", outcome.file_name);
                pending += 1;
            }
            Err(e) => println!("{}: {e}", outcome.file_name),
        }
    }

    while pending > 0 {
        match events.recv().await {
            Some(event) => {
                println!("{}: {:?}", event.filename, event.status);
                pending -= 1;
            }
            None => break,
        }
    }
    tracker.stop();
    Ok(())
}

async fn list_documents(api: Arc<HttpBackend>) -> anyhow::Result<()> {
    let documents = api.list_documents().await?;
    if documents.is_empty() {
        println!("no documents uploaded yet");
        return Ok(());
    }
    for doc in documents {
        println!(
            "{}  {}  [{}] {} ({} pages)",
            doc.doc_id,
            doc.filename,
            doc.doc_type,
            doc.status,
            doc.page_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string()),
        );
    }
    Ok(())
}

async fn submit(
    api: Arc<HttpBackend>,
    config: &PortalConfig,
    request: ClaimRequest,
    explain: bool,
) -> anyhow::Result<()> {
    let mut orchestrator = ClaimOrchestrator::with_deadline(api, config.submit_deadline);

    let decision = match orchestrator.submit(request).await {
        Ok(decision) => decision,
        Err(ClientError::Timeout(deadline)) => {
            error!(?deadline, "submission timed out");
            bail!(
                "the claim is taking longer than expected (no decision within {}s); \
                 please try again",
                deadline.as_secs()
            );
        }
        Err(ClientError::Validation(message)) => bail!("invalid claim: {message}"),
        Err(e) => bail!("claim submission failed: {e}"),
    };

    println!("claim {}: {:?}", decision.claim_id, decision.decision);
    println!(
        "claimed {:.2}, approved {:.2}",
        decision.claimed_amount, decision.approved_amount
    );
    println!("reason: {}", decision.explanation.reason);
    for clause in &decision.explanation.relevant_clauses {
        println!("  - {clause}");
    }

    if explain {
        let detailed = orchestrator.fetch_explanation(&decision.claim_id).await?;
        println!();
        println!("{}", detailed.decision_summary);
        println!("why: {}", detailed.reasoning.primary_reason);
        for factor in &detailed.reasoning.decision_factors {
            println!(
                "  {}: {} ({})",
                factor.factor, factor.value, factor.description
            );
        }
        if !detailed.next_steps.is_empty() {
            println!("next steps:");
            for step in &detailed.next_steps {
                println!("  * {step}");
            }
        }
    }
    Ok(())
}
