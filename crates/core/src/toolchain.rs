//! Built-in speech-recognition provisioning recipe
//!
//! Used when no manifest is present. Provisions an isolated Python
//! environment, Kaldi, the CTC and RNN-transducer loss bindings, and the
//! optional text-processing tools.

use std::path::Path;

use tracing::{debug, warn};

use crate::configs::settings::Settings;
use crate::execution::command::Invocation;
use crate::execution::context::ActionContext;
use crate::registry::{Action, Target, TargetRegistry};
use crate::types::{ActionError, KilnResult};
use crate::variants::ToolchainVariant;

pub const MINICONDA_URL: &str =
    "https://repo.anaconda.com/miniconda/Miniconda3-latest-Linux-x86_64.sh";
pub const KALDI_REPO: &str = "https://github.com/kaldi-asr/kaldi.git";
pub const WARP_CTC_REPO: &str = "https://github.com/jnishi/warp-ctc.git";
pub const WARP_TRANSDUCER_REPO: &str = "https://github.com/HawkAaron/warp-transducer.git";
pub const SENTENCEPIECE_REPO: &str = "https://github.com/google/sentencepiece.git";
pub const NKF_URL: &str = "https://ja.osdn.net/dl/nkf/nkf-2.1.4.tar.gz";
pub const NKF_RELEASE: &str = "nkf-2.1.4";
pub const MOSES_REPO: &str = "https://github.com/moses-smt/mosesdecoder.git";

const NONE: [&str; 0] = [];

/// Register the recipe's targets, picking registration-time variants from
/// `settings`
pub fn register_recipe(registry: &mut TargetRegistry, settings: &Settings) -> KilnResult<()> {
    registry.register_variant(
        "miniconda",
        NONE,
        Some("Isolated Python environment"),
        settings.interpreter_override.is_some(),
        || Action::new(create_virtualenv),
        || Action::new(install_miniconda),
    )?;
    registry.register_variant(
        "kaldi",
        NONE,
        Some("Kaldi speech recognition toolkit"),
        settings.preexisting_toolkit_path.is_some(),
        || Action::new(link_kaldi),
        || Action::new(build_kaldi),
    )?;
    registry.register(
        Target::new("neural_sp", ["miniconda"], Action::new(install_framework))
            .with_description("PyTorch and the toolkit's Python package"),
    )?;
    registry.register(
        Target::new(
            "warp-ctc",
            ["miniconda", "neural_sp"],
            Action::new(|ctx| build_loss_binding(ctx, WARP_CTC_REPO, "warp-ctc")),
        )
        .with_description("CTC loss PyTorch binding"),
    )?;
    registry.register(
        Target::new(
            "warp-transducer",
            ["miniconda", "neural_sp"],
            Action::new(|ctx| build_loss_binding(ctx, WARP_TRANSDUCER_REPO, "warp-transducer")),
        )
        .with_description("RNN-transducer loss PyTorch binding"),
    )?;
    registry.register(
        Target::new("sentencepiece", NONE, Action::new(build_sentencepiece))
            .with_description("SentencePiece tokenizer"),
    )?;
    registry.register(
        Target::new("nkf", NONE, Action::new(build_nkf))
            .with_description("Network Kanji Filter"),
    )?;
    registry.register(
        Target::new(
            "moses",
            NONE,
            Action::new(|ctx| ctx.git_clone(MOSES_REPO, "moses").map(|_| ())),
        )
        .with_description("Moses tokenizer scripts"),
    )?;

    registry.register(
        Target::aggregate("python", ["neural_sp", "warp-ctc", "warp-transducer"])
            .with_description("Python environment with loss bindings"),
    )?;
    registry.register(
        Target::aggregate("extra", ["sentencepiece", "nkf", "moses"])
            .with_description("Optional text-processing tools"),
    )?;
    registry.register(
        Target::aggregate("all", ["miniconda", "kaldi", "python", "extra"])
            .with_description("Everything"),
    )?;

    registry.set_default_targets(vec!["all".to_string()]);
    Ok(())
}

fn pip_install<I, S>(ctx: &ActionContext<'_>, packages: I) -> Result<(), ActionError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let python = ctx.settings.provisioned_python();
    ctx.run(
        Invocation::new(python.display().to_string())
            .args(["-m", "pip", "install"])
            .args(packages),
    )
    .map(|_| ())
}

fn create_virtualenv(ctx: &ActionContext<'_>) -> Result<(), ActionError> {
    let interpreter = ctx.settings.interpreter_override.as_deref().ok_or_else(|| {
        ActionError::Unsupported("no interpreter configured for the virtualenv".to_string())
    })?;

    ctx.remove("venv")?;
    ctx.run(
        Invocation::new(interpreter.display().to_string())
            .args(["-m", "venv"])
            .arg(ctx.path("venv").display().to_string()),
    )?;
    pip_install(ctx, ["--upgrade", "pip", "setuptools", "wheel"])
}

fn install_miniconda(ctx: &ActionContext<'_>) -> Result<(), ActionError> {
    ctx.remove("miniconda.sh")?;
    let installer = ctx.download(MINICONDA_URL, "miniconda.sh")?;

    ctx.remove("miniconda")?;
    ctx.run(
        Invocation::new("bash")
            .arg(installer.display().to_string())
            .arg("-b")
            .arg("-p")
            .arg(ctx.path("miniconda").display().to_string()),
    )?;

    let conda = ctx.path("miniconda").join("bin").join("conda");
    ctx.run(
        Invocation::new(conda.display().to_string())
            .args(["install", "-y"])
            .arg(format!("python={}", ctx.settings.runtime_version)),
    )?;
    pip_install(ctx, ["--upgrade", "pip", "setuptools", "wheel"])
}

fn link_kaldi(ctx: &ActionContext<'_>) -> Result<(), ActionError> {
    let source = ctx.settings.preexisting_toolkit_path.as_deref().ok_or_else(|| {
        ActionError::Unsupported("no pre-existing Kaldi path configured".to_string())
    })?;
    if !source.is_dir() {
        return Err(ActionError::Unsupported(format!(
            "pre-existing Kaldi path {} is not a directory",
            source.display()
        )));
    }
    ctx.symlink(source, "kaldi")
}

fn build_kaldi(ctx: &ActionContext<'_>) -> Result<(), ActionError> {
    // A leftover checkout without a marker may be half-cloned, so start over.
    ctx.git_clone(KALDI_REPO, "kaldi")?;
    ctx.shell_in("kaldi/tools", "make all")?;
    ctx.shell_in("kaldi/src", "./configure --shared --use-cuda=no")?;
    ctx.shell_in("kaldi/src", "make depend")?;
    ctx.shell_in("kaldi/src", "make all")
}

fn install_framework(ctx: &ActionContext<'_>) -> Result<(), ActionError> {
    pip_install(ctx, [format!("torch=={}", ctx.settings.framework_version)])?;
    if let Some(source) = &ctx.settings.source_path {
        pip_install(ctx, ["-e".to_string(), source.display().to_string()])?;
    }
    Ok(())
}

fn build_loss_binding(ctx: &ActionContext<'_>, repo: &str, dir: &str) -> Result<(), ActionError> {
    match ctx.variant() {
        ToolchainVariant::Unsupported {
            framework,
            compiler,
            required,
        } => {
            return Err(ActionError::Unsupported(format!(
                "building extensions for PyTorch {} requires {} >= {} (found {})",
                framework,
                ctx.settings.cxx,
                required,
                compiler.as_deref().unwrap_or("unknown version")
            )));
        }
        variant => debug!(target_name = ctx.target, ?variant, "toolchain accepted"),
    }

    let checkout = ctx.git_clone(repo, dir)?;

    // The native library is optional for the binding; a failed build is not fatal.
    let build_dir = ctx.create_dir(Path::new(dir).join("build"))?;
    let native = ctx.probe(Invocation::shell("cmake .. && make").current_dir(&build_dir))?;
    if !native.success {
        warn!(
            target_name = ctx.target,
            "native build failed, continuing with the binding:\n{}",
            native.tail(10)
        );
    }

    let python = ctx.settings.provisioned_python();
    let mut setup = Invocation::new(python.display().to_string())
        .args(["setup.py", "install"])
        .current_dir(checkout.join("pytorch_binding"));
    if let Some(cuda_home) = &ctx.settings.cuda_home {
        setup = setup.env("CUDA_HOME", cuda_home.display().to_string());
    }
    ctx.run(setup).map(|_| ())
}

fn build_sentencepiece(ctx: &ActionContext<'_>) -> Result<(), ActionError> {
    ctx.git_clone(SENTENCEPIECE_REPO, "sentencepiece")?;
    ctx.create_dir("sentencepiece/build")?;
    ctx.shell_in("sentencepiece/build", "(cmake3 .. || cmake ..) && make")
}

fn build_nkf(ctx: &ActionContext<'_>) -> Result<(), ActionError> {
    ctx.clobber_dir("nkf")?;
    let archive = Path::new("nkf").join(format!("{}.tar.gz", NKF_RELEASE));
    ctx.download(NKF_URL, &archive)?;
    ctx.extract(&archive, "nkf")?;
    ctx.run(
        Invocation::new("make")
            .arg(format!("prefix={}", ctx.workspace().display()))
            .current_dir(ctx.path("nkf").join(NKF_RELEASE)),
    )
    .map(|_| ())
}
