//! Out-of-process archiving library over a line-delimited JSON protocol.
//!
//! Every request is one JSON line on the child's stdin and every response is
//! one JSON line on its stdout. A `compute` request line is followed by
//! exactly `message_len` message bytes and then, for the shapes that take a
//! raw-message argument, `call.raw_len` raw bytes. Any response may instead
//! be `{"error": "..."}`.
//!
//! The library handle keeps one control process for `describe` and
//! `normalize_lid`; each constructed instance gets a fresh process so
//! instance state never leaks between generators.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::archiver::library::{
    ArchiverInstance, ArchiverLibrary, ComputeCall, ComputeResult, ComputeReturn,
    ConstructorCall, FakeArgs, LibraryDescriptor,
};
use crate::core::errors::{HarnessError, Result};

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Describe,
    NormalizeLid { value: &'a str },
    Construct { call: &'a ConstructorCall },
    Compute { call: WireCompute<'a>, message_len: usize },
}

#[derive(Debug, Serialize)]
struct WireCompute<'a> {
    shape: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<&'a FakeArgs>,
    lid: &'a str,
    private: bool,
    /// Length of the raw-message argument sent after the message bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_len: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Response<T> {
    Err { error: String },
    Ok(T),
}

#[derive(Debug, Deserialize)]
struct Ack {
    ok: bool,
}

#[derive(Debug, Deserialize)]
struct NormalizedLid {
    lid: String,
}

#[derive(Debug, Deserialize)]
struct WireReturn {
    arity: usize,
    document: Option<ComputeResult>,
    #[serde(default)]
    contents: BTreeMap<String, String>,
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default)]
    in_reply_to: Option<String>,
}

impl WireReturn {
    fn into_return(self) -> Result<ComputeReturn> {
        match self.arity {
            4 => Ok(ComputeReturn::Full {
                document: self.document,
                contents: self.contents,
                metadata: self.metadata,
                in_reply_to: self.in_reply_to,
            }),
            2 => Ok(ComputeReturn::Pair {
                document: self.document,
                contents: self.contents,
            }),
            n => Err(HarnessError::library(
                "compute",
                format!("library returned {n} values, expected 2 or 4"),
            )),
        }
    }
}

/// One running library process.
struct Channel {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl Channel {
    fn open(command: &[String], working_dir: Option<&Path>) -> Result<Self> {
        let (program, rest) = command.split_first().ok_or_else(|| HarnessError::InvalidConfig {
            details: "archiver.command must not be empty".to_string(),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| HarnessError::library("spawn", format!("{program}: {e}")))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| HarnessError::library("spawn", format!("{program}: no stdout pipe")))?;

        tracing::debug!(program = %program, pid = child.id(), "archiver process started");
        Ok(Self {
            program: program.clone(),
            child,
            stdin,
            stdout,
        })
    }

    fn request<T: DeserializeOwned>(
        &mut self,
        context: &'static str,
        request: &Request<'_>,
        payload: &[&[u8]],
    ) -> Result<T> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| HarnessError::library(context, "request channel closed"))?;
        stdin
            .write_all(&line)
            .and_then(|()| payload.iter().try_for_each(|part| stdin.write_all(part)))
            .and_then(|()| stdin.flush())
            .map_err(|e| HarnessError::library(context, format!("{}: write failed: {e}", self.program)))?;

        let mut response = String::new();
        let read = self
            .stdout
            .read_line(&mut response)
            .map_err(|e| HarnessError::library(context, format!("{}: read failed: {e}", self.program)))?;
        if read == 0 {
            return Err(HarnessError::library(
                context,
                format!("{} exited without responding", self.program),
            ));
        }

        match serde_json::from_str::<Response<T>>(response.trim_end()) {
            Ok(Response::Ok(value)) => Ok(value),
            Ok(Response::Err { error }) => Err(HarnessError::library(context, error)),
            Err(e) => Err(HarnessError::library(
                context,
                format!("malformed response {:?}: {e}", response.trim_end()),
            )),
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        // Closing stdin is the shutdown signal.
        drop(self.stdin.take());
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Archiving library driven through a child process.
pub struct ProcessLibrary {
    command: Vec<String>,
    working_dir: Option<PathBuf>,
    control: Channel,
}

impl std::fmt::Debug for ProcessLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessLibrary")
            .field("command", &self.command)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

impl ProcessLibrary {
    /// Start the control process.
    pub fn spawn(command: &[String], working_dir: Option<&Path>) -> Result<Self> {
        let control = Channel::open(command, working_dir)?;
        Ok(Self {
            command: command.to_vec(),
            working_dir: working_dir.map(Path::to_path_buf),
            control,
        })
    }
}

impl ArchiverLibrary for ProcessLibrary {
    fn describe(&mut self) -> Result<LibraryDescriptor> {
        self.control.request("describe", &Request::Describe, &[])
    }

    fn normalize_lid(&mut self, raw: &str) -> Result<String> {
        let resp: NormalizedLid =
            self.control
                .request("normalize_lid", &Request::NormalizeLid { value: raw }, &[])?;
        Ok(resp.lid)
    }

    fn instantiate(&mut self, call: &ConstructorCall) -> Result<Box<dyn ArchiverInstance>> {
        let mut channel = Channel::open(&self.command, self.working_dir.as_deref())?;
        let ack: Ack = channel.request("construct", &Request::Construct { call }, &[])?;
        if !ack.ok {
            return Err(HarnessError::library("construct", "library refused the constructor call"));
        }
        Ok(Box::new(ProcessInstance { channel }))
    }
}

struct ProcessInstance {
    channel: Channel,
}

impl ArchiverInstance for ProcessInstance {
    fn compute_updates(&mut self, call: ComputeCall<'_>) -> Result<ComputeReturn> {
        let wire = wire_compute(&call);
        let message = call.message().bytes;
        let raw = call.raw().unwrap_or_default();
        let ret: WireReturn = self.channel.request(
            "compute",
            &Request::Compute {
                call: wire,
                message_len: message.len(),
            },
            &[message, raw],
        )?;
        ret.into_return()
    }
}

fn wire_compute<'a>(call: &ComputeCall<'a>) -> WireCompute<'a> {
    let (shape, args) = match *call {
        ComputeCall::Current { args, .. } => ("current", Some(args)),
        ComputeCall::Interim { .. } => ("interim", None),
        ComputeCall::ArgsOnly { args, .. } => ("args-only", Some(args)),
        ComputeCall::Legacy { .. } => ("legacy", None),
    };
    WireCompute {
        shape,
        args,
        lid: call.list_id(),
        private: call.private(),
        raw_len: call.raw().map(<[u8]>::len),
    }
}
