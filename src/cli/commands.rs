// Privacy Guard — CLI Command Handlers
//
// Each function handles one CLI subcommand. `serve` runs the daemon in this
// process; the rest talk to a running daemon through `PrivacyGuardClient`.

use std::sync::Arc;

use serde::Serialize;

use crate::checker::PrivacyChecker;
use crate::client::PrivacyGuardClient;
use crate::config::GuardConfig;
use crate::daemon::PrivacyGuardDaemon;
use crate::error::{GuardError, Result};
use crate::notify::SocketNotifier;
use crate::store::{Database, DateRange, SqlitePolicyStore, UsageCount};

use super::{Cli, Commands, MainPolicyAction, PolicyAction, ReportKind, Switch, Window};

struct Context {
    config: GuardConfig,
    json: bool,
}

impl Context {
    fn client(&self) -> PrivacyGuardClient {
        PrivacyGuardClient::new(&self.config.socket_path, Arc::new(self.config.privacy_mapper()))
            .with_batch_size(self.config.log_batch_size)
    }

    /// Client for package registration. When the daemon is not running,
    /// policies go straight into the database file.
    fn install_client(&self) -> PrivacyGuardClient {
        let store = SqlitePolicyStore::new(Arc::new(Database::new(&self.config.db_path)));
        self.client().with_offline_store(Arc::new(store))
    }

    fn user(&self, user: Option<i32>) -> i32 {
        user.unwrap_or(self.config.user_id)
    }

    fn print<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            let out = serde_json::to_string_pretty(value)
                .map_err(|e| GuardError::Internal(format!("JSON encoding failed: {}", e)))?;
            println!("{}", out);
        } else {
            human(value);
        }
        Ok(())
    }
}

/// Load the config named on the command line (or the default one).
pub fn load_config(cli: &Cli) -> Result<GuardConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(GuardConfig::default_config_path);
    Ok(GuardConfig::load(&path)?)
}

/// Execute the parsed CLI command.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let ctx = Context {
        config,
        json: cli.json,
    };

    match cli.command {
        Commands::Serve => cmd_serve(ctx.config).await,
        Commands::Check {
            package,
            privilege,
            user,
        } => cmd_check(&ctx, &package, &privilege, user),
        Commands::Policy { action } => cmd_policy(&ctx, action),
        Commands::MainPolicy { action } => cmd_main_policy(&ctx, action),
        Commands::Packages { privacy, user } => cmd_packages(&ctx, privacy, user),
        Commands::Report { kind } => cmd_report(&ctx, kind),
        Commands::Install {
            package,
            privileges,
            monitor,
            user,
        } => cmd_install(&ctx, &package, &privileges, monitor, user),
        Commands::Uninstall { package } => cmd_uninstall(&ctx, &package),
        Commands::Upgrade {
            package,
            privileges,
            monitor,
            user,
        } => cmd_upgrade(&ctx, &package, &privileges, monitor, user),
        Commands::Reset { yes } => cmd_reset(&ctx, yes),
    }
}

// ─── Serve ───────────────────────────────────────────────────────────────────

async fn cmd_serve(config: GuardConfig) -> Result<()> {
    println!("Starting Privacy Guard daemon at {}...", config.socket_path.display());
    let daemon = PrivacyGuardDaemon::new(config)?;
    daemon.run_until_signal().await
}

// ─── Check ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CheckOutput<'a> {
    package: &'a str,
    privilege: &'a str,
    decision: crate::checker::Decision,
}

fn cmd_check(ctx: &Context, package: &str, privilege: &str, user: Option<i32>) -> Result<()> {
    let client = Arc::new(ctx.client());
    let checker = PrivacyChecker::new(
        ctx.user(user),
        client,
        Arc::new(ctx.config.privacy_mapper()),
        Arc::new(SocketNotifier::new(&ctx.config.notify_socket_path)),
    );
    let decision = checker.check_allowed(package, privilege);
    checker.finalize();
    let decision = decision?;

    ctx.print(
        &CheckOutput {
            package,
            privilege,
            decision,
        },
        |out| println!("{} → {} : {}", out.package, out.privilege, out.decision),
    )
}

// ─── Policy ──────────────────────────────────────────────────────────────────

fn cmd_policy(ctx: &Context, action: PolicyAction) -> Result<()> {
    let client = ctx.client();
    match action {
        PolicyAction::Get {
            package,
            privacy,
            user,
        } => {
            let policy = client.get_monitor_policy(ctx.user(user), &package, &privacy)?;
            ctx.print(&policy, |p| {
                println!("{} {} = {}", package, privacy, if *p != 0 { "on" } else { "off" })
            })
        }
        PolicyAction::Set {
            package,
            privacy,
            value,
            user,
        } => {
            client.update_monitor_policy(ctx.user(user), &package, &privacy, value.as_policy())?;
            println!("✓ {} {} set to {:?}", package, privacy, value);
            Ok(())
        }
        PolicyAction::List {
            package: Some(package),
            user,
        } => {
            let rows = client.policies_for_package(ctx.user(user), &package)?;
            ctx.print(&rows, |rows| {
                if rows.is_empty() {
                    println!("No policies for {}.", package);
                    return;
                }
                println!("Policies for {} ({}):\n", package, rows.len());
                for (privacy, policy) in rows {
                    println!("  {:45} │ {}", privacy, if *policy != 0 { "on" } else { "off" });
                }
            })
        }
        PolicyAction::List { package: None, .. } => {
            let rows = client.all_monitor_policies()?;
            ctx.print(&rows, |rows| {
                if rows.is_empty() {
                    println!("No policies stored yet.");
                    return;
                }
                println!("Monitor policies ({}):\n", rows.len());
                for row in rows {
                    println!("  {}", row);
                }
            })
        }
    }
}

fn cmd_main_policy(ctx: &Context, action: MainPolicyAction) -> Result<()> {
    let client = ctx.client();
    match action {
        MainPolicyAction::Get { user } => {
            let enabled = client.get_main_monitor_policy(ctx.user(user))?;
            ctx.print(&enabled, |e| {
                println!("Main monitor policy: {}", if *e { "on" } else { "off" })
            })
        }
        MainPolicyAction::Set { value, user } => {
            client.update_main_monitor_policy(ctx.user(user), value.is_on())?;
            println!("✓ Main monitor policy set to {:?}", value);
            Ok(())
        }
    }
}

// ─── Packages & Reports ──────────────────────────────────────────────────────

fn cmd_packages(ctx: &Context, privacy: Option<String>, user: Option<i32>) -> Result<()> {
    let client = ctx.client();
    let user_id = ctx.user(user);
    let packages = match &privacy {
        Some(privacy) => client.packages_by_privacy(user_id, privacy)?,
        None => client.package_ids(user_id)?,
    };
    ctx.print(&packages, |packages| {
        if packages.is_empty() {
            println!("No packages found.");
            return;
        }
        for package in packages {
            println!("  {}", package);
        }
    })
}

fn cmd_report(ctx: &Context, kind: ReportKind) -> Result<()> {
    let client = ctx.client();
    let (rows, title) = match kind {
        ReportKind::Packages { privacy, window } => {
            let (user_id, range) = resolve_window(ctx, &window)?;
            match privacy {
                Some(privacy) => (
                    client.count_packages_for_privacy(user_id, range, &privacy)?,
                    format!("Packages using {}", privacy),
                ),
                None => (client.count_by_package(user_id, range)?, "Accesses per package".to_string()),
            }
        }
        ReportKind::Privacies { package, window } => {
            let (user_id, range) = resolve_window(ctx, &window)?;
            match package {
                Some(package) => (
                    client.count_privacies_for_package(user_id, range, &package)?,
                    format!("Privacy use by {}", package),
                ),
                None => (client.count_by_privacy(user_id, range)?, "Accesses per category".to_string()),
            }
        }
    };
    ctx.print(&rows, |rows| print_counts(&title, rows))
}

fn print_counts(title: &str, rows: &[UsageCount]) {
    if rows.is_empty() {
        println!("No accesses recorded in this window.");
        return;
    }
    println!("{}:", title);
    println!("{:-<60}", "");
    for row in rows {
        println!("  {:48} {:>8}", row.name, row.count);
    }
}

fn resolve_window(ctx: &Context, window: &Window) -> Result<(i32, DateRange)> {
    let end = window.to.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let start = match window.from {
        Some(start) => start,
        None => end - chrono::Duration::days(window.days).num_seconds(),
    };
    if start > end {
        return Err(GuardError::InvalidParameter(format!(
            "window start {} is after end {}",
            start, end
        )));
    }
    Ok((ctx.user(window.user), DateRange::new(start, end)))
}

// ─── Package Lifecycle ───────────────────────────────────────────────────────

fn cmd_install(
    ctx: &Context,
    package: &str,
    privileges: &[String],
    monitor: Switch,
    user: Option<i32>,
) -> Result<()> {
    ctx.install_client()
        .add_monitor_policy(ctx.user(user), package, privileges, monitor.as_policy())?;
    println!("✓ Privacy policies registered for {}", package);
    Ok(())
}

fn cmd_uninstall(ctx: &Context, package: &str) -> Result<()> {
    let client = ctx.client();
    client.delete_logs_by_package(package)?;
    client.delete_monitor_policy_by_package(package)?;
    println!("✓ Removed logs and policies for {}", package);
    Ok(())
}

fn cmd_upgrade(
    ctx: &Context,
    package: &str,
    privileges: &[String],
    monitor: Switch,
    user: Option<i32>,
) -> Result<()> {
    if let Err(e) = cmd_uninstall(ctx, package) {
        tracing::info!(package, error = %e, "Nothing to remove before upgrade");
    }
    cmd_install(ctx, package, privileges, monitor, user)
}

fn cmd_reset(ctx: &Context, yes: bool) -> Result<()> {
    if !yes {
        return Err(GuardError::InvalidParameter(
            "reset deletes every log and policy; pass --yes to confirm".to_string(),
        ));
    }
    ctx.client().delete_all_logs_and_monitor_policy()?;
    println!("✓ All logs and policies deleted");
    Ok(())
}
