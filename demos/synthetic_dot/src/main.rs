use argh::FromArgs;
use std::path::PathBuf;

use lasertag_image::{Image, ImageSize};
use lasertag_tracking::{NativeBackend, PointTracker, TrackerConfig, TrackerConfigPatch};

#[derive(FromArgs)]
/// Track a synthetic green dot moving on an ellipse
struct Args {
    /// frame width
    #[argh(option, default = "320")]
    width: usize,

    /// frame height
    #[argh(option, default = "240")]
    height: usize,

    /// number of frames to render
    #[argh(option, short = 'n', default = "90")]
    frames: usize,

    /// radius of the dot in pixels
    #[argh(option, default = "6")]
    radius: i32,

    /// frame at which the dot disappears
    #[argh(option, default = "40")]
    gap_start: usize,

    /// number of frames the dot stays hidden
    #[argh(option, default = "3")]
    gap_len: usize,

    /// path to a JSON config patch, e.g. {"useKalman": false}
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

fn render(size: ImageSize, center: (f32, f32), radius: i32) -> Result<Image<u8, 3>, Box<dyn std::error::Error>> {
    let mut frame = Image::<u8, 3>::from_size_val(size, 16)?;
    let (cx, cy) = (center.0.round() as i32, center.1.round() as i32);

    for y in (cy - radius).max(0)..=(cy + radius).min(size.height as i32 - 1) {
        for x in (cx - radius).max(0)..=(cx + radius).min(size.width as i32 - 1) {
            if (x - cx).pow(2) + (y - cy).pow(2) <= radius * radius {
                frame.set_pixel(x as usize, y as usize, 0, 40)?;
                frame.set_pixel(x as usize, y as usize, 1, 255)?;
                frame.set_pixel(x as usize, y as usize, 2, 40)?;
            }
        }
    }

    Ok(frame)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut tracker = PointTracker::new(NativeBackend, TrackerConfig::default());
    if let Some(path) = &args.config {
        let patch: TrackerConfigPatch = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        log::info!("applying config patch from {}", path.display());
        tracker.set_params(&patch);
    }
    tracker.init(args.width, args.height)?;

    let size = ImageSize {
        width: args.width,
        height: args.height,
    };
    let (ax, ay) = (args.width as f32 * 0.35, args.height as f32 * 0.35);
    let hidden = args.gap_start..args.gap_start + args.gap_len;

    for i in 0..args.frames {
        let t = i as f32 / args.frames as f32 * std::f32::consts::TAU;
        let truth = (
            args.width as f32 / 2.0 + ax * t.cos(),
            args.height as f32 / 2.0 + ay * t.sin(),
        );

        let frame = if hidden.contains(&i) {
            Image::<u8, 3>::from_size_val(size, 16)?
        } else {
            render(size, truth, args.radius)?
        };

        let Some(result) = tracker.process_frame(&frame)? else {
            println!("{i:4} dropped");
            continue;
        };

        let position = result
            .position
            .map(|p| format!("({:6.1}, {:6.1})", p.x, p.y))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{i:4} truth=({:6.1}, {:6.1}) pos={position} src={:?} tracking={} new_stroke={} missed={} took={:?}",
            truth.0,
            truth.1,
            result.source,
            result.is_tracking,
            result.is_new_stroke,
            result.frames_since_last_detection,
            result.processing_time,
        );
    }

    tracker.dispose();

    Ok(())
}
