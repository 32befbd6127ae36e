use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use reelforge::{
    CancelToken, CommandSpeech, EngineConfig, FfmpegSink, OutlineScriptWriter, Project,
    ProjectStore, ProgressTx, RenderPipeline, Template, TextPurpose, TextRequest, TextGenerator,
    builtin_templates, fill_missing_script, find_builtin, validate_project,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "reelforge", version)]
struct Cli {
    /// Engine configuration JSON; defaults apply to anything it omits.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a project to MP4 (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Check a project's timeline and list every violation.
    Validate(InArgs),
    /// Replace a project's scenes with a template.
    ApplyTemplate(ApplyTemplateArgs),
    /// Save a project's scenes as a reusable template.
    ExportTemplate(ExportTemplateArgs),
    /// List the built-in templates.
    Templates,
    /// Generate a script (or description) for a project that has none.
    Script(ScriptArgs),
}

#[derive(Parser, Debug)]
struct InArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Write the project back with its final status and output.
    #[arg(long)]
    save: bool,

    /// Program that reads text on stdin and writes speech audio to stdout.
    #[arg(long)]
    speech_cmd: Option<String>,

    /// File extension of the audio `--speech-cmd` produces.
    #[arg(long, default_value = "wav")]
    speech_ext: String,
}

#[derive(Parser, Debug)]
struct ApplyTemplateArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Built-in template name or path to a template JSON file.
    #[arg(long)]
    template: String,

    /// Output project JSON (defaults to overwriting the input).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ExportTemplateArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Template name.
    #[arg(long)]
    name: String,

    /// Output template JSON.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct ScriptArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Print a description instead of filling the script.
    #[arg(long)]
    description: bool,

    /// Output project JSON (defaults to overwriting the input).
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    match cli.cmd {
        Command::Render(args) => cmd_render(args, config),
        Command::Validate(args) => cmd_validate(args),
        Command::ApplyTemplate(args) => cmd_apply_template(args),
        Command::ExportTemplate(args) => cmd_export_template(args),
        Command::Templates => cmd_templates(),
        Command::Script(args) => cmd_script(args),
    }
}

fn read_project(path: &Path) -> anyhow::Result<Project> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read project '{}'", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse project '{}'", path.display()))
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("write '{}'", path.display()))
}

fn cmd_render(args: RenderArgs, config: EngineConfig) -> anyhow::Result<()> {
    let store = ProjectStore::new();
    let id = store.insert(read_project(&args.in_path)?)?;
    let mut task = store.begin_render(id)?;
    let project = store.get(id)?;

    let mut pipeline = RenderPipeline::new(config)?;
    if let Some(program) = args.speech_cmd {
        pipeline = pipeline.with_speech(Arc::new(
            CommandSpeech::new(program, Vec::new()).with_extension(args.speech_ext),
        ));
    }

    let (progress, events) = ProgressTx::channel();
    let printer = std::thread::spawn(move || {
        for ev in events {
            eprintln!("[{:>3}%] {}: {}", ev.progress, ev.status, ev.message);
        }
    });

    let mut sink = FfmpegSink::new();
    let result = pipeline.render(&project, &mut task, &mut sink, &progress, &CancelToken::new());
    drop(progress);
    let _ = printer.join();
    store.finish(task);

    if args.save {
        write_json(&args.in_path, &store.get(id)?)?;
    }
    let outcome = result?;
    if let Some(out) = outcome.output {
        eprintln!("wrote {} ({:.2}s, {} frames)", out.display(), outcome.duration, outcome.frames);
    }
    Ok(())
}

fn cmd_validate(args: InArgs) -> anyhow::Result<()> {
    let project = read_project(&args.in_path)?;
    let violations = validate_project(&project);
    if violations.is_empty() {
        eprintln!("ok: {} scenes, {} elements", project.scenes.len(), project.element_count());
        return Ok(());
    }
    for v in &violations {
        eprintln!("{v}");
    }
    anyhow::bail!("{} violation(s)", violations.len())
}

fn load_template(spec: &str) -> anyhow::Result<Template> {
    let path = Path::new(spec);
    if path.is_file() {
        return Ok(Template::from_path(path)?);
    }
    find_builtin(spec).with_context(|| format!("no built-in template or file named '{spec}'"))
}

fn cmd_apply_template(args: ApplyTemplateArgs) -> anyhow::Result<()> {
    let template = load_template(&args.template)?;
    let store = ProjectStore::new();
    let id = store.insert(read_project(&args.in_path)?)?;
    store.apply_template(id, &template)?;
    let out = args.out.unwrap_or(args.in_path);
    write_json(&out, &store.get(id)?)?;
    eprintln!("applied '{}' to {}", template.name, out.display());
    Ok(())
}

fn cmd_export_template(args: ExportTemplateArgs) -> anyhow::Result<()> {
    let project = read_project(&args.in_path)?;
    let template = Template::export(&project, args.name);
    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, template.to_json_pretty()?)
        .with_context(|| format!("write template '{}'", args.out.display()))?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_templates() -> anyhow::Result<()> {
    for t in builtin_templates() {
        println!(
            "{:<14} {:<10} {:>4}s  {} scenes  {}",
            t.name,
            t.category,
            t.estimated_duration,
            t.structure.scenes.len(),
            t.description
        );
    }
    Ok(())
}

fn cmd_script(args: ScriptArgs) -> anyhow::Result<()> {
    let mut project = read_project(&args.in_path)?;
    let writer = OutlineScriptWriter;
    if args.description {
        let text = writer.generate(&TextRequest::for_project(&project, TextPurpose::Description))?;
        println!("{text}");
        return Ok(());
    }
    if !fill_missing_script(&mut project, &writer) {
        eprintln!("script left unchanged");
        return Ok(());
    }
    let out = args.out.unwrap_or(args.in_path);
    write_json(&out, &project)?;
    eprintln!("wrote script to {}", out.display());
    Ok(())
}
