//! # Credit Ledger 命令行
//!
//! 数据库迁移、余额查询、管理员调整、过期预扣对账与模型定价维护

use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use credit_ledger::{
    CreditLedger, LedgerError, ModelCatalog, Result,
    config::{self, AppConfig},
    database, lerror, linfo,
    logging::{self, LogComponent, LogStage},
};

/// 积分账本管理工具
#[derive(Parser, Debug)]
#[command(name = "credit-ledger", version, about = "Credit ledger administration")]
struct Cli {
    /// 配置文件路径，缺省时按 RUST_ENV 查找 config/config.{env}.toml
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// 日志级别
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 执行数据库迁移
    Migrate,

    /// 查询用户余额
    Balance {
        #[arg(short, long)]
        user: i32,
    },

    /// 查询用户交易历史（最新在前）
    History {
        #[arg(short, long)]
        user: i32,
        #[arg(short, long, default_value_t = 20)]
        limit: u64,
    },

    /// 管理员调整余额，负数表示扣减
    Adjust {
        #[arg(long)]
        admin: i32,
        #[arg(short, long)]
        user: i32,
        #[arg(short, long, allow_hyphen_values = true)]
        amount: i64,
        #[arg(short, long)]
        reason: String,
    },

    /// 释放超时未结算的预扣
    Reconcile {
        /// 覆盖配置中的 pending_ttl_secs
        #[arg(long)]
        ttl_secs: Option<u64>,
        /// 只列出过期预扣，不做退款
        #[arg(long)]
        dry_run: bool,
    },

    /// 注册或替换模型定价
    SetPricing {
        #[arg(short, long)]
        provider: String,
        #[arg(short, long)]
        model: String,
        /// 定价 JSON，如 '{"unit":"image","base":60}'
        #[arg(long)]
        pricing: String,
        #[arg(long)]
        display_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_optimized_logging(cli.log_level.as_ref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::Main,
                "command_failed",
                &format!("命令执行失败: {e}")
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let app_config = match cli.config.as_deref() {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config()?,
    };

    let db = Arc::new(database::init_database(&app_config.database).await?);

    if matches!(cli.command, Commands::Migrate) {
        database::run_migrations(&db).await?;
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "migrate_done",
            "数据库迁移完成"
        );
        return Ok(());
    }

    database::check_database_status(&db).await?;
    execute(cli.command, db, &app_config).await
}

async fn execute(command: Commands, db: Arc<DatabaseConnection>, app_config: &AppConfig) -> Result<()> {
    let ledger = CreditLedger::new(db.clone());

    match command {
        Commands::Migrate => Ok(()),
        Commands::Balance { user } => {
            let balance = ledger.balance(user).await?;
            print_json(&serde_json::json!({ "user_id": user, "credit_balance": balance }))
        }
        Commands::History { user, limit } => {
            print_json(&ledger.list_transactions(user, limit).await?)
        }
        Commands::Adjust {
            admin,
            user,
            amount,
            reason,
        } => print_json(&ledger.admin_adjust(admin, user, amount, &reason).await?),
        Commands::Reconcile { ttl_secs, dry_run } => {
            let ttl = ttl_secs.map_or_else(|| app_config.ledger.pending_ttl(), Duration::from_secs);
            if dry_run {
                print_json(&ledger.find_stale_pending(ttl).await?)
            } else {
                print_json(&ledger.release_stale_pending(ttl).await?)
            }
        }
        Commands::SetPricing {
            provider,
            model,
            pricing,
            display_name,
        } => {
            let pricing: serde_json::Value = serde_json::from_str(&pricing)
                .map_err(|e| LedgerError::config_with_source("定价 JSON 解析失败", e))?;
            let catalog = ModelCatalog::new(db);
            print_json(
                &catalog
                    .upsert_model(&provider, &model, display_name, &pricing)
                    .await?,
            )
        }
    }
}

#[allow(clippy::print_stdout)]
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
