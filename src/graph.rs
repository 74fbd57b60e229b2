//! Render plan: the filter graph as an ordered list of tagged stages.
//!
//! Stages are kept structured until the very end so plans can be inspected
//! and tested without running ffmpeg. [`RenderPlan::filter_complex`] and
//! [`RenderPlan::ffmpeg_args`] render them to the engine's syntax.

use crate::config::RenderSettings;
use crate::error::{ComposeError, ComposeResult};
use crate::loader::{MediaRole, StagedInputs};
use crate::timing::ScriptCue;
use serde::{Deserialize, Serialize};

pub const OUTPUT_FILE: &str = "output.mp4";
pub const OUTPUT_MIME: &str = "video/mp4";
pub const OUTPUT_CONTAINER: &str = "mp4";

const CONCAT_LABEL: &str = "vcat";
const VIDEO_OUT_LABEL: &str = "vout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// 9:16 portrait.
    pub const PORTRAIT_1080: FrameSize = FrameSize {
        width: 1080,
        height: 1920,
    };

    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self {
            width: settings.width,
            height: settings.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInput {
    pub role: MediaRole,
    pub file_name: String,
}

/// How long the output runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationPolicy {
    /// Length of the concatenated video.
    Video,
    /// `min(video, audio)`.
    Shortest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_file: Option<String>,
    pub font_size: u32,
    pub font_color: String,
    pub box_color: String,
    pub box_border: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeSpec {
    pub video_codec: String,
    pub audio_codec: Option<String>,
    pub preset: String,
    pub crf: u32,
    pub pixel_format: String,
    pub audio_bitrate: Option<String>,
    pub container: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    /// Cover-scale then center-crop one input to the frame.
    ScaleCrop {
        input: usize,
        frame: FrameSize,
        fps: u32,
        output: String,
    },
    Concat {
        inputs: Vec<String>,
        output: String,
    },
    /// Text shown while `start <= t < end`.
    Overlay {
        input: String,
        text: String,
        start: f64,
        end: f64,
        style: TextStyle,
        output: String,
    },
    AudioMap {
        input: usize,
    },
    Encode(EncodeSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPlan {
    pub inputs: Vec<PlanInput>,
    pub stages: Vec<Stage>,
    pub frame: FrameSize,
    pub duration_policy: DurationPolicy,
    pub output_file: String,
}

/// Checks that can run before anything is fetched.
pub fn validate_inputs(video_count: usize, cues: &[ScriptCue]) -> ComposeResult<()> {
    if video_count == 0 {
        return Err(ComposeError::InvalidPlan("no video inputs".into()));
    }
    if cues.is_empty() {
        return Err(ComposeError::InvalidPlan("cue sequence is empty".into()));
    }
    if let Some(i) = cues.iter().position(|cue| cue.escaped.trim().is_empty()) {
        return Err(ComposeError::InvalidPlan(format!(
            "cue {i} has no text after sanitization"
        )));
    }
    Ok(())
}

/// Output geometry checks; like [`validate_inputs`] these need no staged media.
pub(crate) fn validate_frame(frame: FrameSize, fps: u32) -> ComposeResult<()> {
    if frame.width == 0 || frame.height == 0 {
        return Err(ComposeError::InvalidPlan(format!(
            "frame {}x{} has a zero dimension",
            frame.width, frame.height
        )));
    }
    // yuv420p needs even dimensions
    if frame.width % 2 != 0 || frame.height % 2 != 0 {
        return Err(ComposeError::InvalidPlan(format!(
            "frame {}x{} must have even dimensions",
            frame.width, frame.height
        )));
    }
    if fps == 0 {
        return Err(ComposeError::InvalidPlan("fps must be positive".into()));
    }
    Ok(())
}

pub fn build_plan(
    staged: &StagedInputs,
    cues: &[ScriptCue],
    settings: &RenderSettings,
) -> ComposeResult<RenderPlan> {
    validate_inputs(staged.videos.len(), cues)?;
    let frame = FrameSize::from_settings(settings);
    validate_frame(frame, settings.fps)?;

    let mut inputs: Vec<PlanInput> = staged
        .videos
        .iter()
        .map(|media| PlanInput {
            role: media.role,
            file_name: media.file_name.clone(),
        })
        .collect();

    let mut stages = Vec::with_capacity(staged.videos.len() + cues.len() + 3);
    let mut scaled = Vec::with_capacity(staged.videos.len());
    for i in 0..staged.videos.len() {
        let output = format!("v{i}");
        stages.push(Stage::ScaleCrop {
            input: i,
            frame,
            fps: settings.fps,
            output: output.clone(),
        });
        scaled.push(output);
    }

    stages.push(Stage::Concat {
        inputs: scaled,
        output: CONCAT_LABEL.to_string(),
    });

    let style = TextStyle {
        font_file: staged.font.as_ref().map(|font| font.file_name.clone()),
        font_size: settings.font_size,
        font_color: "white".to_string(),
        box_color: "black@0.5".to_string(),
        box_border: 5,
    };
    let mut current = CONCAT_LABEL.to_string();
    for (i, cue) in cues.iter().enumerate() {
        let output = if i + 1 == cues.len() {
            VIDEO_OUT_LABEL.to_string()
        } else {
            format!("t{i}")
        };
        stages.push(Stage::Overlay {
            input: current,
            text: cue.escaped.clone(),
            start: cue.start,
            end: cue.end,
            style: style.clone(),
            output: output.clone(),
        });
        current = output;
    }

    let duration_policy = match &staged.audio {
        Some(audio) => {
            let index = inputs.len();
            inputs.push(PlanInput {
                role: MediaRole::Audio,
                file_name: audio.file_name.clone(),
            });
            stages.push(Stage::AudioMap { input: index });
            DurationPolicy::Shortest
        }
        None => DurationPolicy::Video,
    };
    let has_audio = duration_policy == DurationPolicy::Shortest;

    stages.push(Stage::Encode(EncodeSpec {
        video_codec: settings.video_codec.clone(),
        audio_codec: has_audio.then(|| settings.audio_codec.clone()),
        preset: settings.preset.clone(),
        crf: settings.crf,
        pixel_format: "yuv420p".to_string(),
        audio_bitrate: has_audio.then(|| settings.audio_bitrate.clone()),
        container: OUTPUT_CONTAINER.to_string(),
    }));

    Ok(RenderPlan {
        inputs,
        stages,
        frame,
        duration_policy,
        output_file: OUTPUT_FILE.to_string(),
    })
}

impl RenderPlan {
    pub fn scale_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages
            .iter()
            .filter(|stage| matches!(stage, Stage::ScaleCrop { .. }))
    }

    pub fn overlay_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|stage| matches!(stage, Stage::Overlay { .. }))
            .count()
    }

    pub fn audio_input(&self) -> Option<usize> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::AudioMap { input } => Some(*input),
            _ => None,
        })
    }

    pub fn encode_spec(&self) -> Option<&EncodeSpec> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Encode(spec) => Some(spec),
            _ => None,
        })
    }

    /// The `-filter_complex` argument: one link per graph stage, `;`-joined.
    pub fn filter_complex(&self) -> String {
        self.stages
            .iter()
            .filter_map(render_link)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Arguments for ffmpeg, run with the staging directory as working dir.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-nostdin",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.file_name.clone());
        }

        args.push("-filter_complex".to_string());
        args.push(self.filter_complex());
        args.push("-map".to_string());
        args.push(format!("[{VIDEO_OUT_LABEL}]"));

        match self.audio_input() {
            Some(index) => {
                args.push("-map".to_string());
                args.push(format!("{index}:a:0"));
            }
            None => args.push("-an".to_string()),
        }

        if let Some(spec) = self.encode_spec() {
            args.extend([
                "-c:v".to_string(),
                spec.video_codec.clone(),
                "-preset".to_string(),
                spec.preset.clone(),
                "-crf".to_string(),
                spec.crf.to_string(),
                "-pix_fmt".to_string(),
                spec.pixel_format.clone(),
            ]);
            if let Some(codec) = &spec.audio_codec {
                args.push("-c:a".to_string());
                args.push(codec.clone());
            }
            if let Some(bitrate) = &spec.audio_bitrate {
                args.push("-b:a".to_string());
                args.push(bitrate.clone());
            }
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }

        if self.duration_policy == DurationPolicy::Shortest {
            args.push("-shortest".to_string());
        }

        args.push(self.output_file.clone());
        args
    }
}

fn render_link(stage: &Stage) -> Option<String> {
    match stage {
        Stage::ScaleCrop {
            input,
            frame,
            fps,
            output,
        } => Some(format!(
            "[{input}:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,fps={fps},format=yuv420p[{output}]",
            w = frame.width,
            h = frame.height,
        )),
        Stage::Concat { inputs, output } => {
            let labels: String = inputs.iter().map(|label| format!("[{label}]")).collect();
            Some(format!(
                "{labels}concat=n={}:v=1:a=0[{output}]",
                inputs.len()
            ))
        }
        Stage::Overlay {
            input,
            text,
            start,
            end,
            style,
            output,
        } => {
            let font = style
                .font_file
                .as_ref()
                .map(|file| format!("fontfile={file}:"))
                .unwrap_or_default();
            Some(format!(
                "[{input}]drawtext={font}expansion=none:text={text}:fontcolor={}:fontsize={}:box=1:boxcolor={}:boxborderw={}:x=(w-text_w)/2:y=(h-text_h)/2:enable='gte(t,{start:.3})*lt(t,{end:.3})'[{output}]",
                style.font_color, style.font_size, style.box_color, style.box_border,
            ))
        }
        Stage::AudioMap { .. } | Stage::Encode(_) => None,
    }
}
