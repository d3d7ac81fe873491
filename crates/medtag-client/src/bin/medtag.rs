//! `medtag` command-line client.
//!
//! Mirrors the app screens as subcommands and prints every response as
//! pretty JSON. The session is kept in `MEDTAG_SESSION_FILE` (default
//! `$HOME/.medtag/session.json`). An expired session exits with status 2.

use clap::{Args, Parser, Subcommand, ValueEnum};
use common::api::{
    AllergyInput, AuditLogFilter, ChronicDiseaseInput, EmergencyContactInput, LoginResponse,
    MedicationInput, Page, ProfileInput, RegisterRequest, RegisterTagRequest, ScanRequest,
    SecurityEventFilter,
};
use common::types::{
    AllergySeverity, AuditAction, AuditSeverity, BloodType, MedicationFrequency, Relationship,
    ResourceType, SecurityEventType, SecuritySeverity,
};
use medtag_client::session::default_session_path;
use medtag_client::{ApiClient, ClientConfig, ClientError, FileSessionStore};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const EXIT_SESSION_EXPIRED: u8 = 2;

#[derive(Parser)]
#[command(name = "medtag", version, about = "MedTag emergency medical data client")]
struct Cli {
    /// API root, e.g. https://medtag.example/api/v1
    #[arg(long, env = "MEDTAG_API_URL", global = true)]
    api_url: Option<String>,

    /// Session file
    #[arg(long, env = "MEDTAG_SESSION_FILE", global = true)]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and log in
    Register(RegisterArgs),
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MEDTAG_PASSWORD", hide_env_values = true)]
        password: String,
        /// Authenticator code, for accounts with two-factor authentication
        #[arg(long)]
        otp: Option<String>,
    },
    /// Revoke the session and forget it locally
    Logout,
    /// Show the logged-in account
    Whoami,
    /// Medical profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Allergies on the profile
    Allergy {
        #[command(subcommand)]
        action: AllergyAction,
    },
    /// Chronic diseases on the profile
    Disease {
        #[command(subcommand)]
        action: DiseaseAction,
    },
    /// Medications on the profile
    Medication {
        #[command(subcommand)]
        action: MedicationAction,
    },
    /// Emergency contacts on the profile
    Contact {
        #[command(subcommand)]
        action: ContactAction,
    },
    /// NFC tags
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Read a tag as a first responder
    Scan {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        key_id: Uuid,
        #[arg(long)]
        checksum: String,
        #[arg(long, allow_hyphen_values = true)]
        latitude: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        longitude: Option<f64>,
        #[arg(long)]
        device: Option<String>,
    },
    /// Emergency data by tag id (QR code)
    Emergency { tag_id: Uuid },
    /// Logs and security events
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Args)]
struct RegisterArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "MEDTAG_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    middle_name: Option<String>,
    #[arg(long)]
    phone: Option<String>,
}

#[derive(Args)]
struct ProfileArgs {
    /// I+, I-, II+, II-, III+, III-, IV+ or IV-
    #[arg(long, allow_hyphen_values = true)]
    blood_type: Option<BloodType>,
    /// Centimetres
    #[arg(long)]
    height: Option<i32>,
    /// Kilograms
    #[arg(long)]
    weight: Option<f64>,
    #[arg(long)]
    notes: Option<String>,
    /// Whether first responders may read the profile
    #[arg(long)]
    public: Option<bool>,
    /// Fields to erase (sent as null)
    #[arg(long, value_enum, value_delimiter = ',')]
    clear: Vec<ProfileField>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProfileField {
    BloodType,
    Height,
    Weight,
    Notes,
}

impl From<ProfileArgs> for ProfileInput {
    fn from(args: ProfileArgs) -> Self {
        let clears = |field| args.clear.contains(&field);
        ProfileInput {
            blood_type: nullable(args.blood_type, clears(ProfileField::BloodType)),
            height: nullable(args.height, clears(ProfileField::Height)),
            weight: nullable(args.weight, clears(ProfileField::Weight)),
            emergency_notes: nullable(args.notes, clears(ProfileField::Notes)),
            is_public: args.public,
        }
    }
}

fn nullable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    match value {
        Some(value) => Some(Some(value)),
        None if clear => Some(None),
        None => None,
    }
}

#[derive(Subcommand)]
enum ProfileAction {
    Show,
    Create(ProfileArgs),
    Update(ProfileArgs),
}

#[derive(Subcommand)]
enum AllergyAction {
    List,
    Add(AllergyArgs),
    Remove { id: Uuid },
}

#[derive(Subcommand)]
enum DiseaseAction {
    List,
    Add(DiseaseArgs),
    Remove { id: Uuid },
}

#[derive(Subcommand)]
enum MedicationAction {
    List,
    Add(MedicationArgs),
    Remove { id: Uuid },
}

#[derive(Subcommand)]
enum ContactAction {
    List,
    Add(ContactArgs),
    Remove { id: Uuid },
}

#[derive(Args)]
struct AllergyArgs {
    #[arg(long)]
    allergen: String,
    #[arg(long, default_value = "MODERATE")]
    severity: AllergySeverity,
    #[arg(long, default_value = "")]
    reaction: String,
}

#[derive(Args)]
struct DiseaseArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    icd_code: String,
}

#[derive(Args)]
struct MedicationArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    dosage: String,
    #[arg(long)]
    frequency: MedicationFrequency,
}

#[derive(Args)]
struct ContactArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    relationship: Relationship,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    email: Option<String>,
    #[arg(long, default_value_t = 1)]
    priority: i32,
}

impl From<AllergyArgs> for AllergyInput {
    fn from(args: AllergyArgs) -> Self {
        AllergyInput {
            allergen: args.allergen,
            severity: args.severity,
            reaction: args.reaction,
            notes: String::new(),
            diagnosed_date: None,
        }
    }
}

impl From<DiseaseArgs> for ChronicDiseaseInput {
    fn from(args: DiseaseArgs) -> Self {
        ChronicDiseaseInput {
            disease_name: args.name,
            icd_code: args.icd_code,
            diagnosis_date: None,
            notes: String::new(),
            is_active: true,
        }
    }
}

impl From<MedicationArgs> for MedicationInput {
    fn from(args: MedicationArgs) -> Self {
        MedicationInput {
            medication_name: args.name,
            dosage: args.dosage,
            frequency: args.frequency,
            start_date: None,
            end_date: None,
            prescribing_doctor: String::new(),
            notes: String::new(),
            is_active: true,
        }
    }
}

impl From<ContactArgs> for EmergencyContactInput {
    fn from(args: ContactArgs) -> Self {
        EmergencyContactInput {
            full_name: args.name,
            relationship: args.relationship,
            phone: args.phone,
            email: args.email,
            priority: args.priority,
        }
    }
}

#[derive(Subcommand)]
enum TagAction {
    List,
    Register {
        uid: String,
        #[arg(long)]
        tag_type: Option<String>,
    },
    Revoke {
        tag_id: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Args)]
struct PageArgs {
    #[arg(long)]
    limit: Option<i64>,
    #[arg(long)]
    offset: Option<i64>,
}

impl From<PageArgs> for Page {
    fn from(args: PageArgs) -> Self {
        Page {
            limit: args.limit,
            offset: args.offset,
        }
    }
}

#[derive(Subcommand)]
enum AdminAction {
    /// Audit trail (admin)
    Logs {
        #[arg(long)]
        user_id: Option<Uuid>,
        #[arg(long)]
        action: Option<AuditAction>,
        #[arg(long)]
        resource_type: Option<ResourceType>,
        #[arg(long)]
        severity: Option<AuditSeverity>,
        #[arg(long)]
        success: Option<bool>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Security events (admin)
    SecurityEvents {
        #[arg(long)]
        event_type: Option<SecurityEventType>,
        #[arg(long)]
        severity: Option<SecuritySeverity>,
        #[arg(long)]
        resolved: Option<bool>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Tag access logs (own tags; all tags for admins)
    AccessLogs {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Emergency reads of own tags
    EmergencyAccesses {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Own audit trail
    MyLogs {
        #[command(flatten)]
        page: PageArgs,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_message(message: &str) -> anyhow::Result<()> {
    print_json(&serde_json::json!({ "message": message }))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::from_env();
    if let Some(url) = cli.api_url.as_deref() {
        config = config.with_base_url(url);
    }
    let session_path = match cli.session_file {
        Some(path) => path,
        None => default_session_path()?,
    };
    let client = ApiClient::new(config, Arc::new(FileSessionStore::new(session_path)))?;

    match cli.command {
        Command::Register(args) => {
            let pair = client
                .auth()
                .register(&RegisterRequest {
                    email: args.email,
                    password_confirm: args.password.clone(),
                    password: args.password,
                    first_name: args.first_name,
                    last_name: args.last_name,
                    middle_name: args.middle_name,
                    phone: args.phone,
                })
                .await?;
            print_json(&pair.user)
        }
        Command::Login {
            email,
            password,
            otp,
        } => match client.auth().login(&email, &password).await? {
            LoginResponse::Authenticated(pair) => print_json(&pair.user),
            LoginResponse::TwoFactorRequired(challenge) => match otp {
                Some(code) => {
                    let pair = client
                        .auth()
                        .verify_two_factor(challenge.user_id, &code)
                        .await?;
                    print_json(&pair.user)
                }
                None => anyhow::bail!("two-factor code required; rerun with --otp <code>"),
            },
        },
        Command::Logout => {
            client.auth().logout().await?;
            print_message("Logged out")
        }
        Command::Whoami => print_json(&client.auth().me().await?),
        Command::Profile { action } => match action {
            ProfileAction::Show => print_json(&client.profile().get().await?),
            ProfileAction::Create(args) => {
                print_json(&client.profile().create(&args.into()).await?)
            }
            ProfileAction::Update(args) => {
                print_json(&client.profile().update(&args.into()).await?)
            }
        },
        Command::Allergy { action } => match action {
            AllergyAction::List => print_json(&client.profile().list_allergies().await?),
            AllergyAction::Add(args) => {
                print_json(&client.profile().add_allergy(&args.into()).await?)
            }
            AllergyAction::Remove { id } => {
                client.profile().delete_allergy(id).await?;
                print_message("Deleted")
            }
        },
        Command::Disease { action } => match action {
            DiseaseAction::List => print_json(&client.profile().list_diseases().await?),
            DiseaseAction::Add(args) => {
                print_json(&client.profile().add_disease(&args.into()).await?)
            }
            DiseaseAction::Remove { id } => {
                client.profile().delete_disease(id).await?;
                print_message("Deleted")
            }
        },
        Command::Medication { action } => match action {
            MedicationAction::List => print_json(&client.profile().list_medications().await?),
            MedicationAction::Add(args) => {
                print_json(&client.profile().add_medication(&args.into()).await?)
            }
            MedicationAction::Remove { id } => {
                client.profile().delete_medication(id).await?;
                print_message("Deleted")
            }
        },
        Command::Contact { action } => match action {
            ContactAction::List => print_json(&client.profile().list_contacts().await?),
            ContactAction::Add(args) => {
                print_json(&client.profile().add_contact(&args.into()).await?)
            }
            ContactAction::Remove { id } => {
                client.profile().delete_contact(id).await?;
                print_message("Deleted")
            }
        },
        Command::Tag { action } => match action {
            TagAction::List => print_json(&client.nfc().tags().await?),
            TagAction::Register { uid, tag_type } => print_json(
                &client
                    .nfc()
                    .register(&RegisterTagRequest {
                        tag_uid: uid,
                        tag_type,
                    })
                    .await?,
            ),
            TagAction::Revoke { tag_id, reason } => {
                print_json(&client.nfc().revoke(tag_id, reason).await?)
            }
        },
        Command::Scan {
            uid,
            key_id,
            checksum,
            latitude,
            longitude,
            device,
        } => print_json(
            &client
                .nfc()
                .scan(&ScanRequest {
                    tag_uid: uid,
                    public_key_id: key_id,
                    checksum,
                    latitude,
                    longitude,
                    device_info: device,
                })
                .await?,
        ),
        Command::Emergency { tag_id } => print_json(&client.nfc().emergency(tag_id).await?),
        Command::Admin { action } => match action {
            AdminAction::Logs {
                user_id,
                action,
                resource_type,
                severity,
                success,
                page,
            } => {
                let filter = AuditLogFilter {
                    user_id,
                    action,
                    resource_type,
                    severity,
                    success,
                    limit: page.limit,
                    offset: page.offset,
                };
                print_json(&client.audit().logs(&filter).await?)
            }
            AdminAction::SecurityEvents {
                event_type,
                severity,
                resolved,
                page,
            } => {
                let filter = SecurityEventFilter {
                    event_type,
                    severity,
                    is_resolved: resolved,
                    limit: page.limit,
                    offset: page.offset,
                };
                print_json(&client.audit().security_events(&filter).await?)
            }
            AdminAction::AccessLogs { page } => {
                print_json(&client.nfc().access_logs(page.into()).await?)
            }
            AdminAction::EmergencyAccesses { page } => {
                print_json(&client.nfc().emergency_accesses(page.into()).await?)
            }
            AdminAction::MyLogs { page } => print_json(&client.audit().my_logs(page.into()).await?),
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err.downcast_ref::<ClientError>(), Some(ClientError::SessionExpired)) {
                eprintln!("{}", ClientError::SessionExpired);
                return ExitCode::from(EXIT_SESSION_EXPIRED);
            }
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
