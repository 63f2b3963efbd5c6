use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::ZipArchive;

/// One screen's blocks document inside a `.aia` archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub name: String,
    /// Full archive path of the `.bky` entry.
    pub entry: String,
    pub source: String,
}

/// Reads every `*.bky` entry of an App Inventor project, sorted by screen name.
pub fn read_aia(input: &Path) -> Result<Vec<Screen>> {
    let file =
        fs::File::open(input).with_context(|| format!("Failed to open '{}'.", input.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("'{}' is not a valid zip/.aia file.", input.display()))?;

    let mut screens = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let entry_name = entry.name().to_string();
        let Some(name) = screen_name(&entry_name) else {
            continue;
        };
        let mut source = String::new();
        entry
            .read_to_string(&mut source)
            .with_context(|| format!("'{}' in '{}' is not UTF-8.", entry_name, input.display()))?;
        debug!(screen = name, entry = %entry_name, "found screen blocks");
        screens.push(Screen {
            name: name.to_string(),
            entry: entry_name,
            source,
        });
    }
    if screens.is_empty() {
        return Err(anyhow!(
            "No .bky screen files found in '{}'.",
            input.display()
        ));
    }
    screens.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.entry.cmp(&b.entry)));
    Ok(screens)
}

/// Copies `input` to `output`, swapping the contents of the entries named in
/// `replacements` (archive path to new text). Everything else is copied as is.
pub fn write_aia(input: &Path, output: &Path, replacements: &BTreeMap<String, String>) -> Result<()> {
    let file =
        fs::File::open(input).with_context(|| format!("Failed to open '{}'.", input.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("'{}' is not a valid zip/.aia file.", input.display()))?;

    let mut buffer = Cursor::new(Vec::<u8>::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            let name = entry.name().to_string();
            if entry.is_dir() {
                writer.add_directory(name, opts)?;
                continue;
            }
            writer.start_file(name.as_str(), opts)?;
            match replacements.get(&name) {
                Some(text) => writer.write_all(text.as_bytes())?,
                None => {
                    let mut bytes = Vec::new();
                    entry.read_to_end(&mut bytes)?;
                    writer.write_all(&bytes)?;
                }
            }
        }
        writer.finish()?;
    }
    fs::write(output, buffer.into_inner())
        .with_context(|| format!("Failed to write '{}'.", output.display()))?;
    Ok(())
}

/// `src/appinventor/ai_me/App/Screen1.bky` -> `Screen1`.
pub fn screen_name(entry: &str) -> Option<&str> {
    if entry.ends_with('/') {
        return None;
    }
    let file = entry.rsplit('/').next()?;
    let name = file.strip_suffix(".bky")?;
    (!name.is_empty()).then_some(name)
}
