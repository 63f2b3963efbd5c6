pub mod block;
pub mod codegen;
pub mod diagnostics;
pub mod graph;
pub mod loader;
pub mod scope;
pub mod semantic;
pub mod symbols;
pub mod workspace;
pub mod yail;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(not(target_arch = "wasm32"))]
pub mod project;

#[cfg(all(target_arch = "wasm32", feature = "wasm-bindings"))]
pub mod wasm;

use anyhow::{anyhow, Context, Result};
pub use codegen::{GenerateOptions, Generation, TopLevelForm};
pub use workspace::Workspace;

#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};

/// Loads one `.bky` document and generates its Yail program.
pub fn compile_bky_source(source: &str, options: &GenerateOptions) -> Result<Generation> {
    let workspace = Workspace::from_graph(loader::load_bky(source)?);
    Ok(workspace.generate(options))
}

/// Splits an `OLD=NEW` rename request.
pub fn parse_rename(raw: &str) -> Result<(String, String)> {
    let (old, new) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid rename '{}': expected OLD=NEW.", raw))?;
    let (old, new) = (old.trim(), new.trim());
    if old.is_empty() || new.is_empty() {
        return Err(anyhow!("Invalid rename '{}': expected OLD=NEW.", raw));
    }
    Ok((old.to_string(), new.to_string()))
}

/// Renames procedures by name, propagating to every caller. Returns the
/// requests that matched a procedure in this workspace.
pub fn apply_procedure_renames(
    workspace: &mut Workspace,
    renames: &[(String, String)],
) -> Result<Vec<(String, String)>> {
    let mut applied = Vec::new();
    for (old, new) in renames {
        let Some(id) = workspace
            .symbols()
            .procedures
            .lookup(old)
            .map(|entry| entry.id.clone())
        else {
            continue;
        };
        workspace
            .rename_procedure(&id, new)
            .with_context(|| format!("Failed to rename procedure '{}' to '{}'.", old, new))?;
        applied.push((old.clone(), new.clone()));
    }
    Ok(applied)
}

#[cfg(not(target_arch = "wasm32"))]
pub fn run_cli(args: &cli::Args) -> Result<()> {
    use std::collections::BTreeMap;
    use std::fs;

    let renames = args
        .rename_procedure
        .iter()
        .map(|raw| parse_rename(raw))
        .collect::<Result<Vec<_>>>()?;

    let total_stages = 4
        + usize::from(!renames.is_empty())
        + usize::from(args.emit_blocks.is_some())
        + usize::from(args.diagnostics_json.is_some());
    let progress = CliProgress::new("Compile", total_stages);
    let mut stage = 0usize;

    stage += 1;
    progress.emit(stage, "Resolving input path");
    let input = canonicalize_file(&args.input)?;
    let archive = match input.extension().and_then(|ext| ext.to_str()) {
        Some("aia") => true,
        Some("bky") => false,
        _ => anyhow::bail!(
            "Unsupported input '{}': expected a .bky or .aia file.",
            pretty_path(&input)
        ),
    };

    stage += 1;
    progress.emit(stage, "Loading blocks");
    let screens = if archive {
        project::read_aia(&input)?
    } else {
        let source = fs::read_to_string(&input)
            .with_context(|| format!("Failed to read '{}'.", pretty_path(&input)))?;
        vec![project::Screen {
            name: file_stem(&input),
            entry: input.display().to_string(),
            source,
        }]
    };
    let mut workspaces = Vec::with_capacity(screens.len());
    for screen in &screens {
        let graph = loader::load_bky(&screen.source)
            .with_context(|| format!("Failed to load screen '{}'.", screen.name))?;
        workspaces.push(Workspace::from_graph(graph));
    }

    if !renames.is_empty() {
        stage += 1;
        progress.emit(stage, "Renaming procedures");
        let mut matched = Vec::new();
        for (screen, workspace) in screens.iter().zip(workspaces.iter_mut()) {
            let applied = apply_procedure_renames(workspace, &renames)
                .with_context(|| format!("In screen '{}'.", screen.name))?;
            matched.extend(applied);
        }
        if let Some((old, _)) = renames.iter().find(|rename| !matched.contains(rename)) {
            anyhow::bail!("No procedure named '{}' in '{}'.", old, pretty_path(&input));
        }
    }

    stage += 1;
    progress.emit(stage, "Generating Yail");
    let options = GenerateOptions {
        warn_orphans: !args.no_orphan_warnings,
    };
    let generations = workspaces
        .iter()
        .map(|workspace| workspace.generate(&options))
        .collect::<Vec<_>>();
    let mut errors = 0usize;
    for (screen, generation) in screens.iter().zip(&generations) {
        for diagnostic in &generation.diagnostics {
            eprintln!("{}: {}", screen.name, diagnostic);
        }
        errors += generation
            .diagnostics
            .iter()
            .filter(|d| d.severity == diagnostics::Severity::Error)
            .count();
    }

    stage += 1;
    progress.emit(stage, "Writing Yail");
    if archive {
        let out_dir = match &args.output {
            Some(path) => path.clone(),
            None => input.with_file_name(format!("{}-yail", file_stem(&input))),
        };
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create '{}'.", pretty_path(&out_dir)))?;
        for (screen, generation) in screens.iter().zip(&generations) {
            let path = out_dir.join(format!("{}.yail", screen.name));
            fs::write(&path, generation.render())
                .with_context(|| format!("Failed to write '{}'.", pretty_path(&path)))?;
        }
    } else {
        let path = match &args.output {
            Some(path) => path.clone(),
            None => input.with_extension("yail"),
        };
        fs::write(&path, generations[0].render())
            .with_context(|| format!("Failed to write '{}'.", pretty_path(&path)))?;
    }

    if let Some(emit_path) = &args.emit_blocks {
        stage += 1;
        progress.emit(stage, "Writing blocks");
        if archive {
            let mut replacements = BTreeMap::new();
            for (screen, workspace) in screens.iter().zip(&workspaces) {
                replacements.insert(screen.entry.clone(), loader::save_bky(workspace.graph())?);
            }
            project::write_aia(&input, emit_path, &replacements)?;
        } else {
            fs::write(emit_path, loader::save_bky(workspaces[0].graph())?)
                .with_context(|| format!("Failed to write '{}'.", pretty_path(emit_path)))?;
        }
    }

    if let Some(json_path) = &args.diagnostics_json {
        stage += 1;
        progress.emit(stage, "Writing diagnostics");
        let mut report = serde_json::Map::new();
        for (screen, generation) in screens.iter().zip(&generations) {
            report.insert(
                screen.name.clone(),
                diagnostics::diagnostics_to_json(&generation.diagnostics),
            );
        }
        let text = serde_json::to_string_pretty(&serde_json::Value::Object(report))?;
        fs::write(json_path, text)
            .with_context(|| format!("Failed to write '{}'.", pretty_path(json_path)))?;
    }

    if args.strict && errors > 0 {
        anyhow::bail!("{} error diagnostic(s) reported.", errors);
    }
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
pub fn canonicalize_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() || !path.is_file() {
        return Err(anyhow!("Input file not found: '{}'.", path.display()));
    }
    Ok(path.canonicalize()?)
}

#[cfg(not(target_arch = "wasm32"))]
fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Screen1".to_string())
}

#[cfg(not(target_arch = "wasm32"))]
fn pretty_path(path: &Path) -> String {
    let raw = path.display().to_string();
    if let Some(stripped) = raw.strip_prefix(r"\\?\") {
        stripped.to_string()
    } else {
        raw
    }
}

#[cfg(not(target_arch = "wasm32"))]
struct CliProgress {
    prefix: &'static str,
    total: usize,
}

#[cfg(not(target_arch = "wasm32"))]
impl CliProgress {
    fn new(prefix: &'static str, total: usize) -> Self {
        Self {
            prefix,
            total: total.max(1),
        }
    }

    fn emit(&self, step: usize, label: &str) {
        let step = step.clamp(1, self.total);
        let bar = render_progress_bar(step, self.total, 14);
        eprintln!(
            "[{}] {}... ({}/{}) {}",
            self.prefix, label, step, self.total, bar
        );
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    let width = width.max(1);
    let filled = ((step * width) + (total / 2)) / total;
    let mut s = String::with_capacity(width + 2);
    s.push('[');
    for i in 0..width {
        s.push(if i < filled { '=' } else { '-' });
    }
    s.push(']');
    s
}
