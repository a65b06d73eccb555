use std::{process, sync::Arc};

use sandmark::{
    application::{
        bootstrap::{BundledEngines, DependencyBootstrap, DependencyState},
        error::{AppError, error_chain},
        render::RenderPipeline,
        sandbox::{SandboxChannel, SandboxClient},
    },
    config::{self, RenderMode},
    domain::types::EngineKind,
    infra::{error::InfraError, stdio, telemetry},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error_chain(error);
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(config::ServeArgs::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let deps = Arc::new(DependencyState::new());
    let source = Arc::new(BundledEngines::new(settings.render.highlight_theme.clone()));
    let bootstrap = Arc::new(DependencyBootstrap::new(Arc::clone(&deps), source));

    match command {
        config::Command::Render(args) => run_render(&bootstrap, &settings, args).await,
        config::Command::Serve(_) => run_serve(bootstrap, &settings).await,
        config::Command::Stylesheets(_) => run_stylesheets(&bootstrap).await,
    }
}

async fn run_render(
    bootstrap: &DependencyBootstrap,
    settings: &config::Settings,
    args: config::RenderArgs,
) -> Result<(), AppError> {
    let text = match args.file.as_ref() {
        Some(path) => tokio::fs::read_to_string(path).await.map_err(|err| {
            AppError::validation(format!("failed to read `{}`: {err}", path.display()))
        })?,
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .map_err(|err| AppError::validation(format!("failed to read stdin: {err}")))?;
            text
        }
    };

    bootstrap.load().await;
    let deps = Arc::clone(bootstrap.state());

    let html = match args.mode {
        RenderMode::Chat => RenderPipeline::new(deps).render(&text)?,
        RenderMode::Sandbox => render_through_channel(deps, settings, &text).await?,
    };

    write_stdout(&html).await
}

/// Send the text to a sandbox channel as a host page would, and wait for the
/// reply under the configured timeout.
async fn render_through_channel(
    deps: Arc<DependencyState>,
    settings: &config::Settings,
    text: &str,
) -> Result<String, AppError> {
    let (inbox, inbox_rx) = mpsc::channel(1);
    let channel = SandboxChannel::new(deps);
    let runner = tokio::spawn(async move { channel.run(inbox_rx).await });

    let client = SandboxClient::connect(inbox, settings.sandbox.reply_timeout);
    let html = client.render(text).await;

    drop(client);
    let _ = runner.await;
    html.map_err(AppError::from)
}

async fn run_serve(
    bootstrap: Arc<DependencyBootstrap>,
    settings: &config::Settings,
) -> Result<(), AppError> {
    let deps = Arc::clone(bootstrap.state());
    bootstrap.on_complete(|state| {
        info!(
            target = "sandmark::serve",
            grammar = state.status(EngineKind::Grammar).as_str(),
            typesetting = state.status(EngineKind::Typesetting).as_str(),
            highlighter = state.status(EngineKind::Highlighter).as_str(),
            search = state.status(EngineKind::Search).as_str(),
            "engines settled; later renders use every ready engine"
        );
    });

    // Requests are answered with fallbacks while this runs.
    let loader = {
        let bootstrap = Arc::clone(&bootstrap);
        tokio::spawn(async move { bootstrap.load().await })
    };

    let channel = Arc::new(
        SandboxChannel::new(deps).with_allowed_origins(settings.sandbox.allowed_origins.clone()),
    );
    let result = stdio::serve(
        channel,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await;

    loader.abort();
    let _ = loader.await;

    result.map_err(AppError::from)
}

async fn run_stylesheets(bootstrap: &DependencyBootstrap) -> Result<(), AppError> {
    bootstrap.load().await;
    let sheets = bootstrap.stylesheets();
    if sheets.is_empty() {
        return Err(AppError::unexpected("no engine with a stylesheet loaded"));
    }
    write_stdout(&sheets.join("\n")).await
}

async fn write_stdout(content: &str) -> Result<(), AppError> {
    let mut stdout = tokio::io::stdout();
    let write = async {
        stdout.write_all(content.as_bytes()).await?;
        if !content.ends_with('\n') {
            stdout.write_all(b"\n").await?;
        }
        stdout.flush().await
    };
    write.await.map_err(|err| AppError::from(InfraError::from(err)))
}
