//! Converter table: which depiction tools exist, what they can read, and how
//! to invoke them.
//!
//! A command template is a shell command line with four placeholders:
//!
//! | Placeholder | Replaced by |
//! |-------------|-------------|
//! | `$path/`    | tool directory plus `/`, or nothing when no directory is set |
//! | `$format`   | source format tag (`mol`, `rxn`) |
//! | `$input`    | source file path |
//! | `$output`   | intermediate SVG path |
//!
//! Every substituted value is shell-escaped. Substitution is a single pass
//! over the template, so a path that happens to contain `$output` is never
//! expanded a second time.

use crate::config::SourceFormat;
use crate::error::MolPreviewError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Default memory ceiling for an external tool, in KiB (300 MiB).
pub const DEFAULT_MEMORY_KIB: u64 = 307_200;

/// How to run one depiction tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterSpec {
    /// Shell command template, see the module docs.
    pub command: String,
    /// Source formats this tool can depict.
    pub supported_formats: BTreeSet<SourceFormat>,
    /// Address-space ceiling for the spawned process in KiB. 0 = unlimited.
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u64,
}

fn default_memory_kib() -> u64 {
    DEFAULT_MEMORY_KIB
}

impl ConverterSpec {
    pub fn new(command: impl Into<String>, formats: impl IntoIterator<Item = SourceFormat>) -> Self {
        Self {
            command: command.into(),
            supported_formats: formats.into_iter().collect(),
            memory_kib: DEFAULT_MEMORY_KIB,
        }
    }

    pub fn with_memory_kib(mut self, kib: u64) -> Self {
        self.memory_kib = kib;
        self
    }

    pub fn supports(&self, format: SourceFormat) -> bool {
        self.supported_formats.contains(&format)
    }
}

/// The converter table plus the single active selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterRegistry {
    /// Identifier of the active converter.
    #[serde(rename = "converter")]
    active: String,
    converters: BTreeMap<String, ConverterSpec>,
}

impl Default for ConverterRegistry {
    /// Open Babel and Indigo, with Indigo active. Babel cannot depict
    /// reactions.
    fn default() -> Self {
        let mut converters = BTreeMap::new();
        converters.insert(
            "babel".to_string(),
            ConverterSpec::new("$path/babel -i$format $input $output", [SourceFormat::Mol]),
        );
        converters.insert(
            "indigo".to_string(),
            ConverterSpec::new(
                "$path/indigo-depict $input $output",
                [SourceFormat::Mol, SourceFormat::Rxn],
            ),
        );
        Self {
            active: "indigo".to_string(),
            converters,
        }
    }
}

impl ConverterRegistry {
    /// An empty table with `active` selected; add converters with [`Self::insert`].
    pub fn new(active: impl Into<String>) -> Self {
        Self {
            active: active.into(),
            converters: BTreeMap::new(),
        }
    }

    pub fn active_id(&self) -> &str {
        &self.active
    }

    pub fn set_active(&mut self, id: impl Into<String>) {
        self.active = id.into();
    }

    pub fn insert(&mut self, id: impl Into<String>, spec: ConverterSpec) {
        self.converters.insert(id.into(), spec);
    }

    pub fn lookup(&self, id: &str) -> Option<&ConverterSpec> {
        self.converters.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.converters.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConverterSpec)> {
        self.converters.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The active converter's spec.
    pub fn active(&self) -> Result<&ConverterSpec, MolPreviewError> {
        self.lookup(&self.active)
            .ok_or_else(|| MolPreviewError::UnknownConverter {
                id: self.active.clone(),
                known: self.ids().collect::<Vec<_>>().join(", "),
            })
    }

    /// True if converter `id` exists and lists `format`.
    pub fn is_capable(&self, id: &str, format: SourceFormat) -> bool {
        self.lookup(id).is_some_and(|spec| spec.supports(format))
    }

    pub fn active_is_capable(&self, format: SourceFormat) -> bool {
        self.is_capable(&self.active, format)
    }

    /// The active converter, provided it can read `format`.
    pub fn converter_for(&self, format: SourceFormat) -> Result<&ConverterSpec, MolPreviewError> {
        let spec = self.active()?;
        if !spec.supports(format) {
            return Err(MolPreviewError::ConverterNotCapable {
                converter: self.active.clone(),
                format: format.to_string(),
            });
        }
        Ok(spec)
    }
}

/// Build the shell command for `spec`.
pub fn build_command(
    spec: &ConverterSpec,
    tool_dir: Option<&Path>,
    format: SourceFormat,
    input: &Path,
    output: &Path,
) -> String {
    substitute_placeholders(
        &spec.command,
        &[
            ("$path/", tool_prefix(tool_dir)),
            ("$format", escape_shell_arg(format.as_str())),
            ("$input", escape_shell_arg(&input.to_string_lossy())),
            ("$output", escape_shell_arg(&output.to_string_lossy())),
        ],
    )
}

/// Escaped `"<dir>/"`, or an empty string when there is no directory.
pub(crate) fn tool_prefix(tool_dir: Option<&Path>) -> String {
    match tool_dir {
        Some(dir) if !dir.as_os_str().is_empty() => {
            escape_shell_arg(&format!("{}/", dir.to_string_lossy()))
        }
        _ => String::new(),
    }
}

/// Single-pass literal replacement. Tokens are tried in slice order at each
/// position; replacement text is never rescanned.
pub(crate) fn substitute_placeholders(template: &str, pairs: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    'scan: while !rest.is_empty() {
        if rest.starts_with('$') {
            for (token, value) in pairs {
                if let Some(after) = rest.strip_prefix(token) {
                    out.push_str(value);
                    rest = after;
                    continue 'scan;
                }
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }

    out
}

/// Quote `arg` for a POSIX shell.
pub fn escape_shell_arg(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}
