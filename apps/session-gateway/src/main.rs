use core_lib::domain::attendance::ModuleScope;
use core_lib::domain::role::Role;
use dotenvy::dotenv;
use session_gateway::SessionGateway;
use session_gateway::config::GatewayConfig;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Logs one role in, fetches one attendance view and reports its stats.
#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting session gateway v{}...", env!("CARGO_PKG_VERSION"));

    let gateway = match SessionGateway::from_config(&config) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to build gateway: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut events = gateway.subscribe_all();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(role = %event.role(), ?event, "Session event");
        }
    });

    let role = match std::env::var("GATEWAY_ROLE")
        .ok()
        .as_deref()
        .map(str::parse::<Role>)
    {
        Some(Ok(role)) => role,
        Some(Err(e)) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
        None => Role::Staff,
    };
    let identifier = std::env::var("GATEWAY_IDENTIFIER").unwrap_or_default();
    let password = std::env::var("GATEWAY_PASSWORD").unwrap_or_default();

    if let Err(e) = gateway.login(role, &identifier, &password).await {
        error!(%role, "Login failed: {}", e);
        return ExitCode::FAILURE;
    }

    let module_id = std::env::args().nth(1);
    let ledger = match (module_id.as_deref(), role) {
        (Some(module_id), _) => gateway.module_attendance(module_id, None).await,
        (None, Role::Admin) => gateway.all_attendance_logs().await,
        (None, _) => gateway.my_attendance().await,
    };
    let ledger = match ledger {
        Ok(ledger) => ledger,
        Err(e) => {
            error!("Fetch failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let scope = match module_id {
        Some(module_id) => ModuleScope::for_module(module_id),
        None => ModuleScope::all(),
    };
    let stats = ledger.stats(&scope);
    info!(
        total = stats.total,
        present = stats.present,
        absent = stats.absent,
        late = stats.late,
        present_percentage = stats.present_percentage,
        attendance_rate = stats.attendance_rate,
        dropped = ledger.dropped(),
        "Attendance summary"
    );
    for record in ledger.view(&scope) {
        info!(
            date = %record.date,
            student = record.student_name.as_deref().unwrap_or(&record.student_id),
            status = %record.status,
            marked_by = %record.marked_by.name,
            "Record"
        );
    }
    ExitCode::SUCCESS
}
