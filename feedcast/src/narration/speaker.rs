use crate::config::NarrationConfig;
use crate::traits::{Speaker, Utterance};
use crate::types::SpeechError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

const TEXT_PLACEHOLDER: &str = "{text}";
const TEXT_B64_UTF16_PLACEHOLDER: &str = "{text_b64_utf16}";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Speaks by running an external program, one child process per utterance.
#[derive(Debug, Clone)]
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    pub fn new(config: &NarrationConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for speaking `text`, placeholders expanded.
    pub fn build_args(&self, text: &str) -> Vec<String> {
        let has_placeholder = self
            .args
            .iter()
            .any(|a| a.contains(TEXT_PLACEHOLDER) || a.contains(TEXT_B64_UTF16_PLACEHOLDER));

        if !has_placeholder {
            let mut args = self.args.clone();
            args.push(text.to_string());
            return args;
        }

        let encoded = utf16le_base64(text);
        self.args
            .iter()
            .map(|a| {
                a.replace(TEXT_B64_UTF16_PLACEHOLDER, &encoded)
                    .replace(TEXT_PLACEHOLDER, text)
            })
            .collect()
    }
}

/// Base64 of the UTF-16LE encoding, the form PowerShell's
/// `[Text.Encoding]::Unicode` decodes.
pub fn utf16le_base64(text: &str) -> String {
    let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
    STANDARD.encode(bytes)
}

#[async_trait]
impl Speaker for CommandSpeaker {
    async fn launch(&self, text: &str) -> Result<Box<dyn Utterance>, SpeechError> {
        if self.program.trim().is_empty() {
            return Err(SpeechError::NotConfigured);
        }

        let mut command = Command::new(&self.program);
        command
            .args(self.build_args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let child = command.spawn().map_err(|source| SpeechError::Launch {
            program: self.program.clone(),
            source,
        })?;
        debug!("Launched {} (pid {:?})", self.program, child.id());

        Ok(Box::new(ProcessUtterance { child }))
    }
}

struct ProcessUtterance {
    child: Child,
}

#[async_trait]
impl Utterance for ProcessUtterance {
    async fn wait(&mut self) -> Result<(), SpeechError> {
        let status = self.child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(SpeechError::Exit(status))
        }
    }

    async fn kill(&mut self) -> Result<(), SpeechError> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await?;
        Ok(())
    }
}
