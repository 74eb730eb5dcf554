//! Library requirement blocks.
//!
//! Each plugin owns one delimited block in a shared text file:
//!
//! ```text
//! ### CirclePlugin Requirements ###
//! invoke
//! ######
//! ```
//!
//! Blocks of other plugins, their order and any lines outside blocks are kept
//! as they are whenever one plugin's block is written or removed.

use std::path::Path;

use indexmap::IndexMap;

use super::{PluginDescriptor, PluginError, PluginResult};

/// Footer line closing every block.
pub const BLOCK_FOOTER: &str = "######";

const HEADER_PREFIX: &str = "### ";
const HEADER_SUFFIX: &str = " Requirements ###";

/// A parsed piece of the requirement file. Lines keep their terminators.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Block { name: String, header: String, lines: Vec<String>, footer: Option<String> },
    Line(String),
}

/// A requirement file split into segments, with its line ending style.
#[derive(Debug, Clone)]
struct Document {
    segments: Vec<Segment>,
    /// Terminator used for lines graft writes.
    newline: &'static str,
    /// Terminator the file ended with, empty if none.
    ending: &'static str,
}

/// Header line for a plugin's block.
pub fn block_header(plugin: &str) -> String {
    format!("{HEADER_PREFIX}{plugin}{HEADER_SUFFIX}")
}

/// Plugin name from a header line.
fn parse_header(line: &str) -> Option<&str> {
    line.strip_prefix(HEADER_PREFIX)?.strip_suffix(HEADER_SUFFIX).filter(|name| !name.is_empty())
}

/// The full block for a plugin: header, libraries in order, footer.
pub fn generate_block(descriptor: &PluginDescriptor) -> Vec<String> {
    let mut block = Vec::with_capacity(descriptor.libraries.len() + 2);
    block.push(block_header(&descriptor.name));
    block.extend(descriptor.libraries.iter().cloned());
    block.push(BLOCK_FOOTER.to_string());
    block
}

/// Payload lines of every block in the file, keyed by plugin name.
///
/// A missing file has no blocks.
pub fn extract_blocks(path: &Path) -> PluginResult<IndexMap<String, Vec<String>>> {
    Ok(Document::read(path)?
        .segments
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Block { name, lines, .. } => {
                Some((name, lines.iter().map(|l| strip_terminator(l).to_string()).collect()))
            }
            Segment::Line(_) => None,
        })
        .collect())
}

/// Requirement block manager bound to one requirement file.
#[derive(Debug, Clone, Copy)]
pub struct RequirementBlocks<'a> {
    path: &'a Path,
}

impl<'a> RequirementBlocks<'a> {
    /// Create a manager for the requirement file at `path`.
    pub fn new(path: &'a Path) -> Self {
        Self { path }
    }

    /// Replace the plugin's block with a fresh one at the end of the file.
    pub fn install(&self, descriptor: &PluginDescriptor) -> PluginResult<()> {
        if descriptor.libraries.is_empty() {
            return Ok(());
        }

        self.require_parent(descriptor)?;
        let mut document = Document::read(self.path)?;

        document.remove_block(&descriptor.name);
        let block = document.block(descriptor);
        document.segments.push(block);

        document.write(self.path)?;
        tracing::debug!(
            plugin = descriptor.name,
            libraries = descriptor.libraries.len(),
            "Wrote requirement block"
        );

        Ok(())
    }

    /// Remove the plugin's block, if present. A missing file, or a missing
    /// directory, leaves nothing to remove.
    pub fn uninstall(&self, descriptor: &PluginDescriptor) -> PluginResult<()> {
        if descriptor.libraries.is_empty() || !self.path.exists() {
            return Ok(());
        }

        let mut document = Document::read(self.path)?;

        if document.remove_block(&descriptor.name) {
            document.write(self.path)?;
            tracing::debug!(plugin = descriptor.name, "Removed requirement block");
        }

        Ok(())
    }

    fn require_parent(&self, descriptor: &PluginDescriptor) -> PluginResult<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
                Err(PluginError::MissingTarget {
                    plugin: descriptor.name.clone(),
                    artifact: "libraries",
                    path: parent.to_path_buf(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl Document {
    fn read(path: &Path) -> PluginResult<Self> {
        if !path.exists() {
            return Ok(Self::parse(""));
        }

        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    fn parse(content: &str) -> Self {
        let newline = match content.find('\n') {
            Some(i) if content[..i].ends_with('\r') => "\r\n",
            _ => "\n",
        };

        if content.is_empty() {
            return Self { segments: Vec::new(), newline, ending: newline };
        }

        let (body, ending) = match content.strip_suffix("\r\n") {
            Some(body) => (body, "\r\n"),
            None => match content.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (content, ""),
            },
        };

        // Every line but the last keeps its terminator
        let pieces: Vec<&str> = body.split('\n').collect();
        let last = pieces.len() - 1;
        let raw_lines = pieces
            .iter()
            .enumerate()
            .map(|(i, piece)| if i < last { format!("{piece}\n") } else { (*piece).to_string() });

        let mut segments = Vec::new();
        let mut open: Option<(String, String, Vec<String>)> = None;

        for raw in raw_lines {
            let line = strip_terminator(&raw).to_string();

            match open.take() {
                Some((name, header, lines)) if line.trim_end() == BLOCK_FOOTER => {
                    segments.push(Segment::Block { name, header, lines, footer: Some(raw) });
                }
                Some((name, header, mut lines)) => {
                    lines.push(raw);
                    open = Some((name, header, lines));
                }
                None => match parse_header(line.trim_end()) {
                    Some(name) => open = Some((name.to_string(), raw, Vec::new())),
                    None => segments.push(Segment::Line(raw)),
                },
            }
        }

        // An unterminated block still belongs to its plugin
        if let Some((name, header, lines)) = open {
            segments.push(Segment::Block { name, header, lines, footer: None });
        }

        Self { segments, newline, ending }
    }

    /// A fresh block for the plugin, in this file's line ending style.
    fn block(&self, descriptor: &PluginDescriptor) -> Segment {
        let mut lines: Vec<String> = generate_block(descriptor)
            .into_iter()
            .map(|line| format!("{line}{}", self.newline))
            .collect();
        let footer = lines.pop();
        let header = lines.remove(0);

        Segment::Block { name: descriptor.name.clone(), header, lines, footer }
    }

    /// Remove the plugin's block. Returns whether there was one.
    fn remove_block(&mut self, plugin: &str) -> bool {
        let before = self.segments.len();
        self.segments.retain(|s| !matches!(s, Segment::Block { name, .. } if name == plugin));
        self.segments.len() != before
    }

    fn render(&self) -> String {
        let count = self.segments.len();
        let mut raw: Vec<&str> = Vec::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Block { header, lines, footer, .. } => {
                    raw.push(header);
                    raw.extend(lines.iter().map(String::as_str));
                    match footer {
                        Some(footer) => raw.push(footer),
                        // Close the block so later blocks are not swallowed by it
                        None if i + 1 < count => raw.push(BLOCK_FOOTER),
                        None => {}
                    }
                }
                Segment::Line(line) => raw.push(line),
            }
        }

        let Some((last, init)) = raw.split_last() else {
            return String::new();
        };

        let mut out = String::new();
        for line in init {
            out.push_str(line);
            if !line.ends_with('\n') {
                out.push_str(self.newline);
            }
        }
        out.push_str(strip_terminator(last));
        out.push_str(self.ending);
        out
    }

    fn write(&self, path: &Path) -> PluginResult<()> {
        std::fs::write(path, self.render())?;
        Ok(())
    }
}

/// A raw line without its `\n` or `\r\n` terminator.
fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n').map_or(line, |l| l.strip_suffix('\r').unwrap_or(l))
}
