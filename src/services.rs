use std::{
    io::Write,
    process::{Command, Stdio},
};

use crate::{
    foundation::error::{ReelError, ReelResult},
    timeline::model::Project,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPurpose {
    #[default]
    Script,
    Description,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub purpose: TextPurpose,
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    /// Target length of the narrated video, seconds.
    #[serde(default)]
    pub duration_hint: Option<f64>,
}

impl TextRequest {
    /// Prompt for a project: the title, a blank line, then the description.
    pub fn for_project(project: &Project, purpose: TextPurpose) -> Self {
        let hint = project.declared_duration();
        Self {
            purpose,
            prompt: format!("{}\n\n{}", project.title.trim(), project.description.trim()),
            style: None,
            duration_hint: (hint > 0.0).then_some(hint),
        }
    }
}

pub trait TextGenerator: Send + Sync {
    fn generate(&self, req: &TextRequest) -> ReelResult<String>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Option<String>,
}

/// Encoded audio returned by a speech service.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    /// File extension matching the container, e.g. `wav`.
    pub extension: String,
}

pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, req: &SpeechRequest) -> ReelResult<SpeechAudio>;
}

/// Offline text generator producing a three-part outline from the project title and description.
#[derive(Clone, Copy, Debug, Default)]
pub struct OutlineScriptWriter;

impl TextGenerator for OutlineScriptWriter {
    fn generate(&self, req: &TextRequest) -> ReelResult<String> {
        let (title, body) = match req.prompt.split_once("\n\n") {
            Some((t, b)) => (t.trim(), b.trim()),
            None => (req.prompt.trim(), ""),
        };
        if title.is_empty() {
            return Err(ReelError::external_service("empty prompt"));
        }
        Ok(match req.purpose {
            TextPurpose::Script => format!(
                "[Intro]\nWelcome to {title}\n\n[Body]\n{body}\n\n[Outro]\nThanks for watching."
            ),
            TextPurpose::Description => {
                format!("{title}\n\n{body}\n\n#Video #Content #Creation")
            }
        })
    }
}

/// Speech service that always fails; used when none is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSpeech;

impl SpeechSynthesizer for NoSpeech {
    fn synthesize(&self, _req: &SpeechRequest) -> ReelResult<SpeechAudio> {
        Err(ReelError::external_service("no speech service configured"))
    }
}

/// Runs an external program that reads text on stdin and writes audio to stdout.
///
/// The requested voice, if any, is passed in the `REELFORGE_VOICE` environment variable.
#[derive(Clone, Debug)]
pub struct CommandSpeech {
    pub program: String,
    pub args: Vec<String>,
    pub extension: String,
}

impl CommandSpeech {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            extension: "wav".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

impl SpeechSynthesizer for CommandSpeech {
    #[tracing::instrument(skip(self, req), fields(program = %self.program, chars = req.text.len()))]
    fn synthesize(&self, req: &SpeechRequest) -> ReelResult<SpeechAudio> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(voice) = &req.voice {
            cmd.env("REELFORGE_VOICE", voice);
        }
        let mut child = cmd.spawn().map_err(|e| {
            ReelError::external_service(format!("spawn speech program '{}': {e}", self.program))
        })?;

        // stdout is drained while stdin is still being written.
        let feeder = child.stdin.take().map(|mut stdin| {
            let text = req.text.clone();
            std::thread::spawn(move || stdin.write_all(text.as_bytes()))
        });
        let out = child
            .wait_with_output()
            .map_err(|e| ReelError::external_service(format!("wait speech program: {e}")))?;
        let write_result = match feeder {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(std::io::Error::other("speech stdin writer panicked"))
            }),
            None => Ok(()),
        };
        if let Err(e) = write_result {
            return Err(ReelError::external_service(format!(
                "write text to speech program: {e}"
            )));
        }
        if !out.status.success() {
            return Err(ReelError::external_service(format!(
                "speech program exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        if out.stdout.is_empty() {
            return Err(ReelError::external_service("speech program produced no audio"));
        }
        Ok(SpeechAudio {
            bytes: out.stdout,
            extension: self.extension.clone(),
        })
    }
}

/// Fill an empty project script from `generator`. Service failures leave the script unset.
pub fn fill_missing_script(project: &mut Project, generator: &dyn TextGenerator) -> bool {
    if !project.script.trim().is_empty() {
        return false;
    }
    match generator.generate(&TextRequest::for_project(project, TextPurpose::Script)) {
        Ok(script) => {
            project.script = script;
            true
        }
        Err(e) => {
            tracing::warn!(project_id = %project.id, error = %e, "script generation failed; left unset");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::model::ProjectId;

    struct Failing;

    impl TextGenerator for Failing {
        fn generate(&self, _req: &TextRequest) -> ReelResult<String> {
            Err(ReelError::external_service("model offline"))
        }
    }

    #[test]
    fn outline_writer_builds_three_parts() {
        let mut p = Project::new(ProjectId(1), "Rust Tips");
        p.description = "Borrowing explained.".to_string();
        let s = OutlineScriptWriter
            .generate(&TextRequest::for_project(&p, TextPurpose::Script))
            .unwrap();
        assert!(s.starts_with("[Intro]\nWelcome to Rust Tips"));
        assert!(s.contains("[Body]\nBorrowing explained."));
        assert!(s.ends_with("Thanks for watching."));

        let d = OutlineScriptWriter
            .generate(&TextRequest::for_project(&p, TextPurpose::Description))
            .unwrap();
        assert!(d.ends_with("#Video #Content #Creation"));
    }

    #[test]
    fn failed_generation_leaves_script_unset() {
        let mut p = Project::new(ProjectId(1), "t");
        assert!(!fill_missing_script(&mut p, &Failing));
        assert!(p.script.is_empty());
        assert!(fill_missing_script(&mut p, &OutlineScriptWriter));
        assert!(!p.script.is_empty());
        // Existing scripts are never overwritten.
        assert!(!fill_missing_script(&mut p, &OutlineScriptWriter));
    }

    #[cfg(unix)]
    #[test]
    fn command_speech_streams_long_input() {
        // `cat` echoes input as it reads it; the input is far larger than a pipe buffer.
        let text = "narration ".repeat(100_000);
        let audio = CommandSpeech::new("cat", vec![])
            .with_extension("raw")
            .synthesize(&SpeechRequest {
                text: text.clone(),
                voice: None,
            })
            .unwrap();
        assert_eq!(audio.bytes.len(), text.len());
        assert_eq!(audio.extension, "raw");
    }

    #[test]
    fn speech_failures_are_external_service_errors() {
        let req = SpeechRequest {
            text: "hi".to_string(),
            voice: None,
        };
        let err = NoSpeech.synthesize(&req).unwrap_err();
        assert!(matches!(err, ReelError::ExternalService(_)));
        let err = CommandSpeech::new("reelforge-definitely-missing-tts", vec![])
            .synthesize(&req)
            .unwrap_err();
        assert!(matches!(err, ReelError::ExternalService(_)));
    }
}
