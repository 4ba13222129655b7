use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::Serialize;

use clockify_report::{
    clockify::ClockifyClient,
    config::Settings,
    report_command::{ReportArgs, ReportCommand},
    transport::Transport,
};

/// Clockifyのタイムエントリーを集計するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- workspaces
/// $ cargo run -- report --period last-month
/// $ cargo run -- report --week 2024-W12 --minimums developer_minimums.json
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(short = 'v', long = "verbose", help = "Enables debug logging")]
    verbose: bool,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// 所属するワークスペースの一覧を表示する。
    Workspaces,
    /// ワークスペースのユーザーの一覧を表示する。
    Users,
    /// ワークスペースのプロジェクトの一覧を表示する。
    Projects,
    /// 期間内の作業時間をユーザーごとに集計する。
    Report(ReportArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logger(args.verbose)?;

    let settings = Settings::from_env()?;
    let transport =
        Transport::new(settings.transport_config()).context("Failed to build HTTP client")?;
    let client = ClockifyClient::new(transport);
    let context = client
        .resolve_context(settings.workspace_id.clone())
        .await
        .context("Failed to resolve workspace")?;

    match args.subcommand {
        SubCommands::Workspaces => print_json(&client.workspaces().await?)?,
        SubCommands::Users => print_json(&client.users(&context).await?)?,
        SubCommands::Projects => print_json(&client.projects(&context).await?)?,
        SubCommands::Report(report) => {
            let report = ReportCommand::new(&client, &context).run(report).await?;
            print_json(&report)?
        }
    }

    Ok(())
}

/// ログを標準エラー出力に書き出す。標準出力はJSONの出力に使う。
fn setup_logger(verbose: bool) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue);
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Warn)
        .chain(io::stderr())
        .apply()
        .context("Failed to initialize logger")?;

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value).context("Failed to write JSON output")?;
    writeln!(handle).context("Failed to write JSON output")?;
    Ok(())
}
