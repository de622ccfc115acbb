//! ffmpeg invocation for a planned timeline
//!
//! The background is the base canvas. Screenshot and avatar events become
//! time-windowed `overlay` filters stacked in z-order, and captions are burned
//! in last through the `ass` filter.

use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};

use super::RenderSpec;
use crate::timeline::{Layer, OverlayEvent, Placement};

/// A single external renderer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderInstruction {
    pub program: String,
    pub args: Vec<String>,
    /// File the renderer writes
    pub output: PathBuf,
}

/// Build the ffmpeg call rendering `spec` into `output`, burning `caption_file`.
#[must_use]
pub fn build_instruction(spec: &RenderSpec, caption_file: &Path, ffmpeg_path: &str, output: &Path) -> RenderInstruction {
    let timeline = &spec.timeline;
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-y"]
        .iter()
        .map(std::string::ToString::to_string)
        .collect();

    let mut background = None;
    let mut overlays: Vec<(usize, &OverlayEvent)> = Vec::new();
    let mut input_index = 0usize;

    for event in &timeline.events {
        match &event.layer {
            Layer::Background { source } => {
                // Loops a short clip; `-t` below trims a long one
                args.extend(["-stream_loop".to_string(), "-1".to_string()]);
                args.extend(["-i".to_string(), source.to_string_lossy().to_string()]);
                background = Some(input_index);
                input_index += 1;
            }
            Layer::Screenshot { source, .. } | Layer::Avatar { source } => {
                args.extend(["-loop".to_string(), "1".to_string()]);
                args.extend(["-i".to_string(), source.to_string_lossy().to_string()]);
                overlays.push((input_index, event));
                input_index += 1;
            }
            Layer::Caption { .. } => {}
        }
    }

    let audio_index = input_index;
    args.extend(["-i".to_string(), spec.audio.to_string_lossy().to_string()]);

    let graph = build_filter_graph(spec, background, &overlays, caption_file);
    args.extend(["-filter_complex".to_string(), graph]);
    args.extend(["-map".to_string(), "[vout]".to_string()]);
    args.extend(["-map".to_string(), format!("{audio_index}:a")]);

    let encode = &spec.encode;
    args.extend([
        "-c:v".to_string(),
        encode.codec.clone(),
        "-preset".to_string(),
        encode.preset.clone(),
        "-crf".to_string(),
        encode.crf.to_string(),
        "-r".to_string(),
        timeline.fps.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        encode.audio_codec.clone(),
        "-b:a".to_string(),
        encode.audio_bitrate.clone(),
        "-t".to_string(),
        format_secs(timeline.duration),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        output.to_string_lossy().to_string(),
    ]);

    RenderInstruction {
        program: ffmpeg_path.to_string(),
        args,
        output: output.to_path_buf(),
    }
}

fn build_filter_graph(
    spec: &RenderSpec,
    background: Option<usize>,
    overlays: &[(usize, &OverlayEvent)],
    caption_file: &Path,
) -> String {
    let timeline = &spec.timeline;
    let (w, h, fps) = (timeline.width, timeline.height, timeline.fps);
    let mut chains: Vec<String> = Vec::new();

    // Base canvas: background filling the frame, or black when there is none
    match background {
        Some(idx) => chains.push(format!(
            "[{idx}:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,fps={fps}[base]"
        )),
        None => chains.push(format!(
            "color=c=black:s={w}x{h}:r={fps}:d={}[base]",
            format_secs(timeline.duration)
        )),
    }

    let mut current = "base".to_string();
    for (n, (idx, event)) in overlays.iter().enumerate() {
        let layer_label = format!("ov{n}");
        let out_label = format!("v{n}");

        let mut chain = format!("[{idx}:v]");
        chain.push_str(&scale_filter(&event.placement, w));
        if let Layer::Screenshot { fade_in, fade_out, .. } = event.layer {
            chain.push_str(",format=rgba");
            if fade_in > 0.0 {
                let _ = write!(
                    chain,
                    ",fade=t=in:st={}:d={}:alpha=1",
                    format_secs(event.start),
                    format_secs(fade_in)
                );
            }
            if fade_out > 0.0 {
                let _ = write!(
                    chain,
                    ",fade=t=out:st={}:d={}:alpha=1",
                    format_secs(event.end - fade_out),
                    format_secs(fade_out)
                );
            }
        }
        let _ = write!(chain, "[{layer_label}]");
        chains.push(chain);

        let (x, y) = overlay_xy(&event.placement);
        chains.push(format!(
            "[{current}][{layer_label}]overlay=x={x}:y={y}:enable='gte(t,{})*lt(t,{})'[{out_label}]",
            format_secs(event.start),
            format_secs(event.end)
        ));
        current = out_label;
    }

    chains.push(format!("[{current}]ass='{}'[vout]", escape_filter_path(caption_file)));
    chains.join(";")
}

fn scale_filter(placement: &Placement, frame_width: u32) -> String {
    match placement {
        Placement::Anchored { width, .. } => format!("scale={width}:-2"),
        Placement::Fill | Placement::Text { .. } => format!("scale={frame_width}:-2"),
    }
}

fn overlay_xy(placement: &Placement) -> (String, String) {
    match placement {
        Placement::Anchored {
            position,
            margin_x,
            margin_y,
            ..
        } => position.to_overlay_expr(*margin_x, *margin_y),
        Placement::Fill | Placement::Text { .. } => ("0".to_string(), "0".to_string()),
    }
}

/// Escape a path for use inside a quoted filter argument.
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

fn format_secs(secs: f64) -> String {
    let s = format!("{secs:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() { "0".to_string() } else { s.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VideoConfig;
    use crate::render::EncodeSettings;
    use crate::timeline::{OverlayPosition, Timeline};

    fn spec() -> RenderSpec {
        let mut timeline = Timeline::new(45.0, 1080, 1920, 60);
        timeline.push(OverlayEvent {
            start: 0.0,
            end: 45.0,
            placement: Placement::Anchored {
                position: OverlayPosition::BottomRight,
                width: 500,
                margin_x: 30,
                margin_y: 30,
            },
            layer: Layer::Avatar {
                source: "/assets/avatar.png".into(),
            },
        });
        timeline.push(OverlayEvent {
            start: 0.0,
            end: 5.0,
            placement: Placement::Anchored {
                position: OverlayPosition::MiddleCenter,
                width: 972,
                margin_x: 0,
                margin_y: 0,
            },
            layer: Layer::Screenshot {
                source: "/assets/shot.png".into(),
                fade_in: 0.3,
                fade_out: 0.3,
            },
        });
        timeline.push(OverlayEvent {
            start: 0.0,
            end: 45.0,
            placement: Placement::Fill,
            layer: Layer::Background {
                source: "/assets/bg.mp4".into(),
            },
        });

        RenderSpec {
            job_id: "j1".to_string(),
            output_path: "/out/j1.mp4".into(),
            audio: "/audio/j1.mp3".into(),
            encode: EncodeSettings::from(&VideoConfig::default()),
            timeline,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let pos = args.iter().position(|a| a == flag).unwrap();
        &args[pos + 1]
    }

    #[test]
    fn test_inputs_follow_z_order() {
        let instr = build_instruction(&spec(), Path::new("/tmp/c.ass"), "ffmpeg", Path::new("/out/j1.part.mp4"));
        let inputs: Vec<&String> = instr
            .args
            .windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| &w[1])
            .collect();

        assert_eq!(
            inputs,
            vec!["/assets/bg.mp4", "/assets/shot.png", "/assets/avatar.png", "/audio/j1.mp3"]
        );
        assert_eq!(value_after(&instr.args, "-stream_loop"), "-1");
        assert!(instr.args.iter().any(|a| a == "3:a"));
        assert_eq!(instr.args.last().unwrap(), "/out/j1.part.mp4");
        assert_eq!(instr.output, PathBuf::from("/out/j1.part.mp4"));
    }

    #[test]
    fn test_filter_graph_windows_and_captions() {
        let instr = build_instruction(&spec(), Path::new("/tmp/c.ass"), "ffmpeg", Path::new("/out/x.mp4"));
        let graph = value_after(&instr.args, "-filter_complex");

        assert!(graph.starts_with(
            "[0:v]scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920"
        ));
        assert!(graph.contains("fade=t=in:st=0:d=0.3:alpha=1"));
        assert!(graph.contains("fade=t=out:st=4.7:d=0.3:alpha=1"));
        assert!(graph.contains("[base][ov0]overlay=x=(main_w-overlay_w)/2:y=(main_h-overlay_h)/2:enable='gte(t,0)*lt(t,5)'[v0]"));
        assert!(graph.contains("[v0][ov1]overlay=x=main_w-overlay_w-30:y=main_h-overlay_h-30:enable='gte(t,0)*lt(t,45)'[v1]"));
        assert!(graph.ends_with("[v1]ass='/tmp/c.ass'[vout]"));
    }

    #[test]
    fn test_encode_settings_applied() {
        let instr = build_instruction(&spec(), Path::new("/tmp/c.ass"), "/usr/bin/ffmpeg", Path::new("/out/x.mp4"));

        assert_eq!(instr.program, "/usr/bin/ffmpeg");
        assert_eq!(value_after(&instr.args, "-c:v"), "libx264");
        assert_eq!(value_after(&instr.args, "-preset"), "ultrafast");
        assert_eq!(value_after(&instr.args, "-crf"), "23");
        assert_eq!(value_after(&instr.args, "-r"), "60");
        assert_eq!(value_after(&instr.args, "-t"), "45");
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(
            escape_filter_path(Path::new("C:\\tmp\\it's.ass")),
            "C\\:\\\\tmp\\\\it\\'s.ass"
        );
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(45.0), "45");
        assert_eq!(format_secs(4.7), "4.7");
        assert_eq!(format_secs(0.0), "0");
        assert_eq!(format_secs(59.1234), "59.123");
    }
}
