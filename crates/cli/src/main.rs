//! `fusewasm run <path.wasm> [--invoke name] [args...] [--wasi]`
//! (`SPEC_FULL.md` §6).

mod args;
mod context;
mod values;

use std::process::ExitCode;

use anyhow::{anyhow, bail, Context as _, Result};
use clap::Parser;
use fusewasm_wasi::WasiCtx;
use tracing_subscriber::EnvFilter;

use crate::{args::Args, context::Context};

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:?}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run(args: Args) -> Result<ExitCode> {
    let wasi_ctx = args.wasi.then(|| {
        WasiCtx::builder()
            .arg(args.wasm_file.to_string_lossy())
            .args(args.func_args.iter().cloned())
            .inherit_env()
            .build()
    });

    let mut ctx = Context::new(&args.wasm_file, wasi_ctx)?;

    let invoke_name = match &args.invoke {
        Some(name) => name.clone(),
        None if args.wasi => "_start".to_string(),
        None => {
            let names: Vec<&str> = ctx.exported_funcs().map(|(name, _)| name).collect();
            bail!("missing --invoke FUNCTION; module exports: {}", names.join(", "));
        }
    };

    let (func, ty) = ctx.get_func(&invoke_name)?;
    let params = ty.params().to_vec();
    let results = ty.results().to_vec();

    let cli_args: Vec<String> = if args.invoke.is_some() { args.func_args.clone() } else { Vec::new() };
    let param_bytes = values::encode_args(&params, &cli_args).with_context(|| format!("failed to parse arguments for {invoke_name:?}"))?;
    let mut result_bytes = vec![0u8; ty.result_bytes()];

    if let Err(trap) = ctx.call(func, &param_bytes, &mut result_bytes) {
        if let Some(wasi) = ctx.wasi() {
            if let Some(code) = wasi.exit_code() {
                return Ok(exit_code(code));
            }
        }
        return Err(anyhow!("{}", render_trap(&ctx, &trap)));
    }

    for value in values::decode_results(&results, &result_bytes) {
        println!("{value}");
    }
    Ok(ExitCode::SUCCESS)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from((code & 0xff) as u8)
}

/// Renders a trap together with the call-stack trace that produced it,
/// naming each frame's module the way `spec.md` §4.7/§8 scenario 2 require.
fn render_trap(ctx: &Context, trap: &fusewasm::Trap) -> String {
    let mut out = format!("{trap}");
    for frame in ctx.call_stack_frames().iter().rev() {
        let module = ctx.store().registry.name(frame.module).unwrap_or("<unknown>");
        out.push_str(&format!("\n    at {module}::func[{}]", frame.func.to_u32()));
    }
    out
}
