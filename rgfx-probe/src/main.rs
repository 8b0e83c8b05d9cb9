#![deny(unsafe_op_in_unsafe_fn)]

mod demo;
mod list;
mod shader;

use clap::Parser;
use rgfx::descriptor::{AdapterDescriptor, InstanceDescriptor, InstanceExtension};
use rgfx::{BackendKind, Instance};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default, clap::ValueEnum)]
enum TracingLogLevel {
    Off,
    Trace,
    Info,
    Debug,
    Warn,
    #[default]
    Error,
}

impl From<TracingLogLevel> for tracing::Level {
    fn from(value: TracingLogLevel) -> Self {
        match value {
            //Off never reaches the filter
            TracingLogLevel::Off => tracing::Level::TRACE,
            TracingLogLevel::Trace => tracing::Level::TRACE,
            TracingLogLevel::Info => tracing::Level::INFO,
            TracingLogLevel::Debug => tracing::Level::DEBUG,
            TracingLogLevel::Warn => tracing::Level::WARN,
            TracingLogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliBackend {
    #[default]
    Auto,
    Vulkan,
    Webgpu,
}

impl From<CliBackend> for BackendKind {
    fn from(value: CliBackend) -> Self {
        match value {
            CliBackend::Auto => BackendKind::Auto,
            CliBackend::Vulkan => BackendKind::Vulkan,
            CliBackend::Webgpu => BackendKind::WebGpu,
        }
    }
}

#[derive(clap::Parser, Debug)]
#[command(about = "Inspect adapters and exercise rgfx devices offscreen")]
struct CliArgs {
    #[arg(short, long, default_value = "error")]
    tracing_log_level: TracingLogLevel,
    #[arg(short, long, default_value = "auto")]
    backend: CliBackend,
    /// Adapter index as printed by `list`.
    #[arg(short, long)]
    adapter: Option<u32>,
    /// Enable validation layers where the backend has them.
    #[arg(long)]
    graphics_debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Print instance extensions and every adapter.
    List,
    /// Run offscreen demos on one adapter and check their results.
    Run {
        #[arg(short, long, value_enum, default_value = "all")]
        demo: demo::Demo,
    },
}

fn main() -> eyre::Result<()> {
    let cli_args = CliArgs::parse();

    if cli_args.tracing_log_level != TracingLogLevel::Off {
        let stdout_log = tracing_subscriber::fmt::layer().pretty();
        tracing_subscriber::registry()
            .with(
                stdout_log.with_filter(
                    tracing_subscriber::filter::LevelFilter::from_level(
                        cli_args.tracing_log_level.into(),
                    ),
                ),
            )
            .init();
    }

    let backend = rgfx::load_backend(cli_args.backend.into())?;
    tracing::info!("Using {} backend", backend.name());

    let mut extensions = Vec::new();
    if cli_args.graphics_debug {
        extensions.push(InstanceExtension::Debug);
    }
    let instance = Instance::new(&InstanceDescriptor {
        backend,
        application_name: Some("rgfx-probe"),
        application_version: 1,
        enabled_extensions: &extensions,
    })?;

    match cli_args.command {
        Command::List => list::print(&instance),
        Command::Run { demo } => {
            let adapter = instance.request_adapter(&AdapterDescriptor {
                adapter_index: cli_args.adapter,
                ..Default::default()
            })?;
            demo::run(&adapter, demo)
        }
    }
}
