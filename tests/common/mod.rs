#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

use mailarchive_harness::archiver::library::{
    ArchiverInstance, ArchiverLibrary, AttachmentDescriptor, ComputeCall, ComputeResult, ComputeReturn,
    ConstructorCall, ConstructorKeywords, LibraryDescriptor,
};
use mailarchive_harness::archiver::shape::{ComputeShape, ConstructorShape};
use mailarchive_harness::core::errors::{HarnessError, Result};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_mah") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "mah.exe" } else { "mah" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve mah binary path for integration test"),
    }
}

/// Run the CLI with an isolated HOME so no user config leaks in. Every case
/// leaves a log file with its argv and both streams.
pub fn run_cli_case(case_name: &str, home: &Path, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("mah-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut cmd = Command::new(&bin_path);
    cmd.args(args)
        .env("HOME", home)
        .env("RUST_BACKTRACE", "1")
        .env_remove("MAH_LOG");
    for key in [
        "MAH_ARCHIVER_COMMAND",
        "MAH_ARCHIVER_SHAPE",
        "MAH_RUNNER_FAIL_FAST",
        "MAH_RUNNER_LIST_ID",
        "MAH_COLLATE_MISSING_ID",
        "MAH_LOG_JSONL",
    ] {
        cmd.env_remove(key);
    }
    let output = cmd.output().expect("execute mah command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──────────────────── mbox fixtures ────────────────────

/// One fixture message.
#[derive(Debug, Clone)]
pub struct Msg {
    pub envelope: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Msg {
    pub fn with_id(id: &str) -> Self {
        Self {
            envelope: format!("From {id} Mon Jan  1 00:00:00 2024"),
            headers: vec![("Message-ID".to_string(), id.to_string())],
            body: format!("body of {id}\n"),
        }
    }

    pub fn without_id(subject: &str) -> Self {
        Self {
            envelope: "From anonymous Mon Jan  1 00:00:00 2024".to_string(),
            headers: vec![("Subject".to_string(), subject.to_string())],
            body: format!("about {subject}\n"),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }
}

/// Serialize messages as an LF mbox: envelope, headers, blank line, body,
/// and one separator blank line between messages.
pub fn mbox_bytes(messages: &[Msg]) -> Vec<u8> {
    let mut out = String::new();
    for (i, msg) in messages.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&msg.envelope);
        out.push('\n');
        for (name, value) in &msg.headers {
            out.push_str(&format!("{name}: {value}\n"));
        }
        out.push('\n');
        out.push_str(&msg.body);
    }
    out.into_bytes()
}

pub fn write_mbox(dir: &Path, name: &str, messages: &[Msg]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, mbox_bytes(messages)).expect("write mbox fixture");
    path
}

// ──────────────────── stub archiver libraries ────────────────────

/// How a stub derives the mid of a message.
#[derive(Debug, Clone)]
pub enum MidRule {
    /// `<generator>:<message-id>`, independent of the calling shape.
    PerGenerator,
    /// Always this value.
    Fixed(String),
}

/// In-process archiver declaring one calling shape.
#[derive(Debug, Clone)]
pub struct StubLibrary {
    pub descriptor: LibraryDescriptor,
    pub compute: ComputeShape,
    pub arity: usize,
    pub mid: MidRule,
    pub lid_prefix: String,
    pub attachments: Vec<AttachmentDescriptor>,
    pub constructed: Vec<ConstructorCall>,
}

impl StubLibrary {
    pub fn new(constructor: ConstructorShape, compute: ComputeShape) -> Self {
        let constructor_keywords: Vec<String> = match constructor {
            ConstructorShape::Oldest => vec!["parseHTML".into()],
            ConstructorShape::Transitional => {
                vec!["generator".into(), "parse_html".into(), "ignore_body".into()]
            }
            ConstructorShape::Current => vec!["generator".into(), "parse_html".into()],
        };
        Self {
            descriptor: LibraryDescriptor {
                constructor_keywords,
                compute_parameters: compute.parameters().iter().map(ToString::to_string).collect(),
                generator_selector: constructor == ConstructorShape::Oldest,
                generators: vec!["medium".into(), "full".into(), "medium-legacy".into()],
            },
            compute,
            arity: if compute == ComputeShape::Legacy { 2 } else { 4 },
            mid: MidRule::PerGenerator,
            lid_prefix: "lid".to_string(),
            attachments: Vec::new(),
            constructed: Vec::new(),
        }
    }

    pub fn generators(mut self, names: &[&str]) -> Self {
        self.descriptor.generators = names.iter().map(ToString::to_string).collect();
        self
    }

    pub fn fixed_mid(mut self, mid: &str) -> Self {
        self.mid = MidRule::Fixed(mid.to_string());
        self
    }

    pub fn arity(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    /// Report `attachments` for every message.
    pub fn attachments(mut self, attachments: Vec<AttachmentDescriptor>) -> Self {
        self.attachments = attachments;
        self
    }
}

impl ArchiverLibrary for StubLibrary {
    fn describe(&mut self) -> Result<LibraryDescriptor> {
        Ok(self.descriptor.clone())
    }

    fn normalize_lid(&mut self, raw: &str) -> Result<String> {
        Ok(format!("{}:{}", self.lid_prefix, raw.trim()))
    }

    fn instantiate(&mut self, call: &ConstructorCall) -> Result<Box<dyn ArchiverInstance>> {
        self.constructed.push(call.clone());
        let generator = match &call.keywords {
            ConstructorKeywords::Oldest { .. } => None,
            ConstructorKeywords::Transitional { generator, .. }
            | ConstructorKeywords::Current { generator, .. } => generator.clone(),
        }
        .or_else(|| call.generator_selector.clone());
        Ok(Box::new(StubInstance {
            generator,
            compute: self.compute,
            arity: self.arity,
            mid: self.mid.clone(),
            attachments: self.attachments.clone(),
        }))
    }
}

struct StubInstance {
    generator: Option<String>,
    compute: ComputeShape,
    arity: usize,
    mid: MidRule,
    attachments: Vec<AttachmentDescriptor>,
}

/// Text after the header block.
fn body_of(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    text.split_once("\n\n").map(|(_, body)| body.to_string())
}

impl ArchiverInstance for StubInstance {
    fn compute_updates(&mut self, call: ComputeCall<'_>) -> Result<ComputeReturn> {
        let expected = match call {
            ComputeCall::Current { .. } => ComputeShape::Current,
            ComputeCall::Interim { .. } => ComputeShape::Interim,
            ComputeCall::ArgsOnly { .. } => ComputeShape::ArgsOnly,
            ComputeCall::Legacy { .. } => ComputeShape::Legacy,
        };
        if expected != self.compute {
            return Err(HarnessError::library("compute", "called with the wrong shape"));
        }

        let message = call.message();
        let mid = match &self.mid {
            MidRule::PerGenerator => format!(
                "{}:{}",
                self.generator.as_deref().unwrap_or("default"),
                message.message_id_or_empty()
            ),
            MidRule::Fixed(mid) => mid.clone(),
        };
        let document = Some(ComputeResult {
            mid,
            body: body_of(message.bytes),
            attachments: self.attachments.clone(),
        });
        Ok(if self.arity == 4 {
            ComputeReturn::Full {
                document,
                contents: BTreeMap::new(),
                metadata: serde_json::Value::Null,
                in_reply_to: None,
            }
        } else {
            ComputeReturn::Pair {
                document,
                contents: BTreeMap::new(),
            }
        })
    }
}

/// Every constructor/compute combination the probe recognises.
pub fn all_shapes() -> Vec<(ConstructorShape, ComputeShape)> {
    let mut shapes = Vec::new();
    for ctor in [
        ConstructorShape::Oldest,
        ConstructorShape::Transitional,
        ConstructorShape::Current,
    ] {
        for compute in ComputeShape::ALL {
            shapes.push((ctor, compute));
        }
    }
    shapes
}
