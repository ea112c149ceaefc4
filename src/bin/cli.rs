use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use clap::Subcommand;
use tracing::info;

use inference_toolkit::content_types::{ACCEPT_HEADER, CONTENT_TYPE_HEADER};
use inference_toolkit::{
    telemetry, ArrayLike, Environment, HandlerFn, HandlerModule, InvocationContext, ModelHandle,
    ModuleRegistry, RequestRecord, Transformer,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file with the serving environment, read instead of environment variables
    #[arg(short, long, env = "INFERENCE_TOOLKIT_CONFIG")]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a payload and encode it again for an Accept header
    Transcode {
        /// File holding the request body
        #[clap(short, long)]
        input: PathBuf,

        /// Content type of the request body
        #[clap(short = 't', long)]
        content_type: String,

        /// Accept header, the environment's default accept type when omitted
        #[clap(short, long)]
        accept: Option<String>,

        /// Write the response here instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the serving environment as JSON
    Env,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let environment = match &args.config_file {
        Some(path) => Environment::from_toml(path)?,
        None => Environment::from_env()?,
    };
    telemetry::init_logging(environment.log_level.as_deref());

    match args.cmd {
        Commands::Transcode {
            input,
            content_type,
            accept,
            output,
        } => transcode(environment, input, content_type, accept, output),
        Commands::Env => {
            println!("{}", serde_json::to_string_pretty(&environment)?);
            Ok(())
        }
    }
}

fn transcode(
    environment: Environment,
    input: PathBuf,
    content_type: String,
    accept: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let body =
        std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;

    // The default input and output functions do the work; the model echoes its input.
    let module = HandlerModule::new(environment.module_name())
        .with_model_fn(HandlerFn::new("model_fn", |_: (PathBuf,)| Ok(ModelHandle::new(()))))
        .with_predict_fn(HandlerFn::new(
            "predict_fn",
            |(data, _model): (ArrayLike, ModelHandle)| Ok(data),
        ));
    let mut transformer =
        Transformer::new(ModuleRegistry::new().with_module(module)).with_environment(environment);

    let mut headers = vec![(CONTENT_TYPE_HEADER.to_string(), content_type)];
    if let Some(accept) = accept {
        headers.push((ACCEPT_HEADER.to_string(), accept));
    }
    let mut context = InvocationContext::new().with_request("cli", headers);

    let mut responses = transformer.transform(&[RequestRecord::new(body)], &mut context);
    if let Some((status, phrase)) = context.response_status() {
        let detail = responses
            .first()
            .and_then(|body| body.as_text())
            .unwrap_or_default();
        bail!("Transcoding failed with status {status} ({phrase}):\n{detail}");
    }
    let Some(response) = responses.pop() else {
        bail!("Transcoding produced no response");
    };
    info!(
        content_type = context.response_content_type(0).unwrap_or_default(),
        bytes = response.as_bytes().len(),
        "transcoded payload"
    );

    match output {
        Some(path) => std::fs::write(&path, response.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => std::io::stdout().write_all(response.as_bytes())?,
    }
    Ok(())
}
