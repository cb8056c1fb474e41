use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

use shorts_compositor::{
    audio::{AudioFormat, AudioStream},
    composition::{
        batch::{exit_code_for, EXIT_EMPTY_POOL, EXIT_FATAL, EXIT_SKIPPED},
        Baker, BatchPaths, BatchRunner, Compiler, Job, ShortsPipeline,
    },
    config::{Config, Layout},
    error::{CompositionError, CompositorError, Result, VideoError},
    segment::{ChromaKey, Segmenter},
    video::{
        EncodeOptions, EncodedVideo, Frame, FrameStream, MediaDecoder, MediaEncoder, OpenedMedia,
        Raster, StreamInfo,
    },
};

const GREEN: [u8; 3] = [0, 255, 0];
const SKIN: [u8; 3] = [224, 172, 105];
const MAIN: [u8; 3] = [40, 60, 200];

/// Decoder that serves prepared streams by file name
#[derive(Default)]
struct FakeDecoder {
    media: HashMap<String, OpenedMedia>,
    audio: HashMap<String, AudioStream>,
    /// Names that fail with an error no other item could recover from
    structural: HashSet<String>,
    /// Names whose decoding panics
    panicking: HashSet<String>,
}

impl FakeDecoder {
    fn with_media(mut self, name: &str, video: FrameStream, audio: Option<AudioStream>) -> Self {
        self.media.insert(name.to_string(), OpenedMedia { video, audio });
        self
    }

    fn with_audio(mut self, name: &str, audio: AudioStream) -> Self {
        self.audio.insert(name.to_string(), audio);
        self
    }

    fn with_structural_failure(mut self, name: &str) -> Self {
        self.structural.insert(name.to_string());
        self
    }

    fn with_panic(mut self, name: &str) -> Self {
        self.panicking.insert(name.to_string());
        self
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

fn not_found(path: &Path) -> CompositorError {
    VideoError::DecodeFailed {
        path: path.display().to_string(),
        reason: "corrupt".to_string(),
    }
    .into()
}

impl MediaDecoder for FakeDecoder {
    fn open(&self, path: &Path) -> Result<OpenedMedia> {
        let name = file_name(path);
        if self.panicking.contains(&name) {
            panic!("decoder crashed on {}", name);
        }
        if self.structural.contains(&name) {
            return Err(CompositionError::InvalidParameters {
                details: format!("{} cannot be laid out on this canvas", name),
            }
            .into());
        }
        self.media.get(&name).cloned().ok_or_else(|| not_found(path))
    }

    fn open_audio(&self, path: &Path) -> Result<AudioStream> {
        self.audio.get(&file_name(path)).cloned().ok_or_else(|| not_found(path))
    }
}

/// Encoder that pulls the first and last frame and remembers what it saw
#[derive(Default)]
struct RecordingEncoder {
    encoded: Mutex<Vec<(PathBuf, StreamInfo, f64)>>,
}

impl MediaEncoder for RecordingEncoder {
    fn encode(
        &self,
        video: &FrameStream,
        audio: Option<&AudioStream>,
        output: &Path,
        _options: &EncodeOptions,
    ) -> Result<EncodedVideo> {
        video.frame(0)?;
        video.frame(video.frame_count() - 1)?;

        let audio_duration = audio.map_or(0.0, |a| a.duration());
        self.encoded
            .lock()
            .unwrap()
            .push((output.to_path_buf(), *video.info(), audio_duration));

        Ok(EncodedVideo {
            path: output.to_path_buf(),
            duration: video.duration(),
            frame_count: video.frame_count(),
            file_size: 0,
        })
    }
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.fit.kernel_size = 5;
    config.batch.workers = 2;
    config
}

/// Small canvas so per-frame work stays cheap
fn tiny_config() -> Config {
    let mut config = fast_config();
    config.canvas.width = 108;
    config.canvas.height = 192;
    config.reaction.width = 40;
    config.batch.workers = 1;
    config
}

/// 1280x720, 10 s at 30 fps
fn main_clip() -> FrameStream {
    FrameStream::still(Frame::new_filled(1280, 720, MAIN), 30.0, 10.0).unwrap()
}

/// Green screen with a subject block
fn reaction_frame() -> Frame {
    let mut frame = Frame::new_filled(640, 360, GREEN);
    for y in 80..280 {
        for x in 220..420 {
            frame.set_pixel(x, y, SKIN);
        }
    }
    frame
}

/// 4 s at 30 fps
fn reaction_clip() -> FrameStream {
    FrameStream::still(reaction_frame(), 30.0, 4.0).unwrap()
}

fn tone(seconds: f64, value: f32) -> AudioStream {
    let format = AudioFormat::default();
    let frames = format.frames_for(seconds);
    AudioStream::new(vec![value; frames * 2], format.sample_rate, format.channels).unwrap()
}

fn decoder() -> FakeDecoder {
    FakeDecoder::default()
        .with_media("main.mp4", main_clip(), Some(tone(10.0, 0.1)))
        .with_media("reaction.mp4", reaction_clip(), None)
        .with_audio("music.mp3", tone(4.0, 0.2))
}

/// Pipeline whose encoder output nobody inspects
fn build_pipeline(config: Config, decoder: FakeDecoder) -> ShortsPipeline {
    ShortsPipeline::new(config, Arc::new(decoder), Arc::new(RecordingEncoder::default())).unwrap()
}

fn job() -> Job {
    Job {
        index: 1,
        input: PathBuf::from("main.mp4"),
        reaction: Some(PathBuf::from("reaction.mp4")),
        music: PathBuf::from("music.mp3"),
        output: PathBuf::from("out/output_1_main_shorts.mp4"),
    }
}

fn job_for(index: usize, input: &str) -> Job {
    Job {
        index,
        input: PathBuf::from(input),
        output: PathBuf::from(format!("out/output_{}_{}", index, input)),
        ..job()
    }
}

#[test]
fn test_cutout_scenario() {
    let encoder = Arc::new(RecordingEncoder::default());
    let pipeline = ShortsPipeline::new(fast_config(), Arc::new(decoder()), encoder).unwrap();
    let short = pipeline.compose(&job()).unwrap();

    assert_eq!(short.video.frame_count(), 300);
    assert_eq!(short.video.info().size(), (1080, 1920));
    assert_eq!(short.video.fps(), 30.0);

    // The reaction layer as the pipeline builds it: scaled to 400 wide, then keyed
    let keyed = ChromaKey::new(Config::default().chroma)
        .unwrap()
        .segment(&reaction_clip().scaled_to_width(400).unwrap())
        .unwrap();
    let (cut_w, cut_h) = keyed.color().info().size();
    assert_eq!((cut_w, cut_h), (400, 225));
    let top = 1920 - cut_h;

    for index in [0, 150, 299] {
        let frame = short.video.frame(index).unwrap();
        assert_eq!(frame.dimensions(), (1080, 1920));

        let color = keyed.color().frame(0).unwrap();
        let matte = keyed.matte().frame(0).unwrap();
        let mut covered = 0;
        for y in 0..cut_h {
            for x in 0..cut_w {
                if matte.get(x, y) > 0.0 {
                    covered += 1;
                    assert_eq!(frame.get_pixel(x, top + y), color.get_pixel(x, y));
                }
            }
        }
        assert!(covered > 0);

        // Middle of the canvas is the letterboxed main clip
        assert_eq!(frame.get_pixel(540, 960), MAIN);
    }

    // Audio law: dialogue and looped music fill exactly the video's duration
    assert_eq!(short.audio.duration(), 10.0);
    assert_eq!(short.audio.sample_rate(), 44_100);
    let mixed = short.audio.sample_at(300_000, 0);
    assert!((mixed - (0.1 * 0.8 + 0.2 * 0.4)).abs() < 1e-6);
}

#[test]
fn test_recomposition_is_byte_identical() {
    let pipeline = build_pipeline(fast_config(), decoder());

    let first = pipeline.compose(&job()).unwrap();
    let second = pipeline.compose(&job()).unwrap();
    for index in [0, 77, 299] {
        assert_eq!(first.video.frame(index).unwrap(), second.video.frame(index).unwrap());
    }
    assert_eq!(first.audio.samples(), second.audio.samples());
}

#[test]
fn test_split_and_plain_layouts() {
    let mut config = fast_config();
    config.batch.layout = Layout::Split;
    let pipeline = build_pipeline(config, decoder());
    let split = pipeline.compose(&job()).unwrap();
    assert_eq!(split.video.info().size(), (1080, 1920));
    let frame = split.video.frame(10).unwrap();
    assert_eq!(frame.get_pixel(540, 480), MAIN);
    assert_eq!(frame.get_pixel(540, 1440), SKIN);
    // Music only, at the split default volume
    assert!((split.audio.sample_at(1_000, 0) - 0.2 * 0.5).abs() < 1e-6);

    let mut config = fast_config();
    config.batch.layout = Layout::Plain;
    let pipeline = build_pipeline(config, decoder());
    let mut plain_job = job();
    plain_job.reaction = None;
    let plain = pipeline.compose(&plain_job).unwrap();
    assert_eq!(plain.video.info().size(), (1280, 670));
    assert_eq!(plain.video.frame_count(), 300);
}

#[test]
fn test_overlay_fades_in_at_its_anchor() {
    let mut banner = image::RgbaImage::new(200, 40);
    for pixel in banner.pixels_mut() {
        *pixel = image::Rgba([255, 0, 0, 255]);
    }
    let pipeline = build_pipeline(fast_config(), decoder()).with_overlay(banner);
    let short = pipeline.compose(&job()).unwrap();

    // Centered horizontally, top edge 150 px above the bottom
    let (x, y) = (540, 1920 - 150 + 20);
    assert_eq!(short.video.frame(0).unwrap().get_pixel(x, y), MAIN);
    assert_eq!(short.video.frame(150).unwrap().get_pixel(x, y), [255, 0, 0]);
    let fading = short.video.frame(15).unwrap().get_pixel(x, y);
    assert!(fading[0] > MAIN[0] && fading[0] < 255);
}

#[tokio::test]
async fn test_batch_plans_runs_and_skips() {
    let root = tempdir().unwrap();
    let dirs: Vec<PathBuf> = ["inputs", "reactions", "music", "out"]
        .iter()
        .map(|name| root.path().join(name))
        .collect();
    for dir in &dirs {
        std::fs::create_dir(dir).unwrap();
    }
    std::fs::write(dirs[0].join("main.mp4"), b"").unwrap();
    std::fs::write(dirs[0].join("broken.mp4"), b"").unwrap();
    std::fs::write(dirs[0].join("notes.txt"), b"").unwrap();
    std::fs::write(dirs[1].join("reaction.mp4"), b"").unwrap();
    std::fs::write(dirs[2].join("music.mp3"), b"").unwrap();

    let encoder = Arc::new(RecordingEncoder::default());
    let pipeline =
        ShortsPipeline::new(fast_config(), Arc::new(decoder()), encoder.clone()).unwrap();
    let runner = BatchRunner::new(pipeline);
    let paths = BatchPaths {
        inputs: dirs[0].clone(),
        reactions: Some(dirs[1].clone()),
        music: dirs[2].clone(),
        output: dirs[3].clone(),
    };

    let jobs = runner.plan(&paths, &mut StdRng::seed_from_u64(7)).unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].output, dirs[3].join("output_1_broken_shorts.mp4"));
    assert_eq!(jobs[1].output, dirs[3].join("output_2_main_shorts.mp4"));
    assert!(jobs.iter().all(|job| job.reaction.is_some()));

    let report = runner.run(jobs).await;
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].input, dirs[0].join("broken.mp4"));
    assert_eq!(report.exit_code(), EXIT_SKIPPED);

    let encoded = encoder.encoded.lock().unwrap();
    assert_eq!(encoded.len(), 1);
    assert_eq!(encoded[0].1.frame_count, 300);
    assert_eq!(encoded[0].2, 10.0);
}

#[test]
fn test_empty_pool_aborts_before_work() {
    let root = tempdir().unwrap();
    for name in ["inputs", "reactions", "music"] {
        std::fs::create_dir(root.path().join(name)).unwrap();
    }
    std::fs::write(root.path().join("inputs/main.mp4"), b"").unwrap();
    std::fs::write(root.path().join("music/music.mp3"), b"").unwrap();

    let runner = BatchRunner::new(build_pipeline(fast_config(), decoder()));
    let paths = BatchPaths {
        inputs: root.path().join("inputs"),
        reactions: Some(root.path().join("reactions")),
        music: root.path().join("music"),
        output: root.path().join("out"),
    };

    let err = runner.plan(&paths, &mut StdRng::seed_from_u64(1)).unwrap_err();
    assert!(err.is_empty_pool());
    assert!(err.aborts_batch());
    assert_eq!(exit_code_for(&err), EXIT_EMPTY_POOL);
}

#[test]
fn test_seeded_planning_is_reproducible() {
    let root = tempdir().unwrap();
    for name in ["inputs", "reactions", "music"] {
        std::fs::create_dir(root.path().join(name)).unwrap();
    }
    for i in 0..5 {
        std::fs::write(root.path().join(format!("inputs/clip{}.mp4", i)), b"").unwrap();
        std::fs::write(root.path().join(format!("reactions/r{}.mp4", i)), b"").unwrap();
        std::fs::write(root.path().join(format!("music/m{}.mp3", i)), b"").unwrap();
    }

    let runner = BatchRunner::new(build_pipeline(fast_config(), decoder()));
    let paths = BatchPaths {
        inputs: root.path().join("inputs"),
        reactions: Some(root.path().join("reactions")),
        music: root.path().join("music"),
        output: root.path().join("out"),
    };

    let first = runner.plan(&paths, &mut StdRng::seed_from_u64(42)).unwrap();
    let second = runner.plan(&paths, &mut StdRng::seed_from_u64(42)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_compile_joins_clips_under_music() {
    let root = tempdir().unwrap();
    let shorts = root.path().join("shorts");
    let music = root.path().join("music");
    std::fs::create_dir(&shorts).unwrap();
    std::fs::create_dir(&music).unwrap();
    std::fs::write(shorts.join("a.mp4"), b"").unwrap();
    std::fs::write(shorts.join("b.mp4"), b"").unwrap();
    std::fs::write(music.join("music.mp3"), b"").unwrap();

    let (a, b) = (Frame::new_filled(54, 96, MAIN), Frame::new_filled(54, 96, SKIN));
    let decoder = FakeDecoder::default()
        .with_media("a.mp4", FrameStream::still(a, 30.0, 2.0).unwrap(), None)
        .with_media("b.mp4", FrameStream::still(b, 25.0, 1.0).unwrap(), None)
        .with_audio("music.mp3", tone(0.5, 0.2));
    let encoder = RecordingEncoder::default();
    let config = fast_config();
    let compiler = Compiler::new(&config, &decoder, &encoder);

    let output = root.path().join("final.mp4");
    let plan = compiler.plan(&shorts, &music, &output, &mut StdRng::seed_from_u64(3)).unwrap();
    assert_eq!(plan.clips, vec![shorts.join("a.mp4"), shorts.join("b.mp4")]);

    let encoded = compiler.run(&plan).unwrap();
    assert_eq!(encoded.frame_count, 90);
    assert_eq!(encoded.duration, 3.0);

    let seen = encoder.encoded.lock().unwrap();
    assert_eq!(seen[0].2, 3.0);
}

#[test]
fn test_one_frame_clip_keeps_slower_reaction() {
    // A single 60 fps frame is shorter than half a frame of the 24 fps reaction
    let blip = FrameStream::from_frames(vec![Frame::new_filled(1280, 720, MAIN)], 60.0).unwrap();
    let slow_reaction = FrameStream::still(reaction_frame(), 24.0, 2.0).unwrap();
    let decoder = decoder()
        .with_media("blip.mp4", blip, None)
        .with_media("reaction.mp4", slow_reaction, None);
    let short = build_pipeline(tiny_config(), decoder).compose(&job_for(1, "blip.mp4")).unwrap();
    assert_eq!(short.video.frame_count(), 1);
    assert_eq!(short.video.fps(), 60.0);
    assert_eq!(short.video.frame(0).unwrap().dimensions(), (108, 192));
}

#[tokio::test]
async fn test_structural_error_aborts_batch() {
    let decoder = decoder()
        .with_media("b.mp4", main_clip(), None)
        .with_media("c.mp4", main_clip(), None)
        .with_structural_failure("a_structural.mp4");
    let runner = BatchRunner::new(build_pipeline(tiny_config(), decoder));

    let jobs = vec![
        job_for(1, "a_structural.mp4"),
        job_for(2, "b.mp4"),
        job_for(3, "c.mp4"),
    ];
    let report = runner.run(jobs).await;

    let aborted = report.aborted.as_ref().unwrap();
    assert_eq!(aborted.input, PathBuf::from("a_structural.mp4"));
    assert!(aborted.reason.contains("cannot be laid out"));
    assert_eq!(report.exit_code(), EXIT_FATAL);
    // Every item is accounted for, whether it finished before the abort or not
    assert_eq!(report.total(), 3);
    assert!(report.succeeded.len() <= 2);
    assert!(report
        .skipped
        .iter()
        .all(|item| item.input != PathBuf::from("a_structural.mp4")));
}

#[tokio::test]
async fn test_panicking_item_is_skipped_by_name() {
    let decoder = decoder().with_panic("boom.mp4");
    let runner = BatchRunner::new(build_pipeline(tiny_config(), decoder));

    let report = runner.run(vec![job_for(1, "main.mp4"), job_for(2, "boom.mp4")]).await;
    assert!(report.aborted.is_none());
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].input, PathBuf::from("boom.mp4"));
    assert!(report.skipped[0].reason.contains("panicked"));
    assert_eq!(report.exit_code(), EXIT_SKIPPED);
}

/// 64x36 MAIN with a SKIN block at x 16..48, y 8..28
fn subject_clip() -> FrameStream {
    let mut frame = Frame::new_filled(64, 36, MAIN);
    for y in 8..28 {
        for x in 16..48 {
            frame.set_pixel(x, y, SKIN);
        }
    }
    FrameStream::still(frame, 30.0, 1.0).unwrap()
}

/// White where the subject is, at twice the size and rate of the subject clip
fn matte_clip(seconds: f64) -> FrameStream {
    let mut frame = Frame::new_filled(128, 72, [0, 0, 0]);
    for y in 16..56 {
        for x in 32..96 {
            frame.set_pixel(x, y, [255, 255, 255]);
        }
    }
    FrameStream::still(frame, 60.0, seconds).unwrap()
}

fn assert_close(actual: [u8; 3], expected: [u8; 3]) {
    for c in 0..3 {
        assert!(
            (actual[c] as i16 - expected[c] as i16).abs() <= 1,
            "{:?} != {:?}",
            actual,
            expected
        );
    }
}

#[test]
fn test_bake_paints_subject_over_key_color() {
    let decoder = FakeDecoder::default()
        .with_media("subject.mp4", subject_clip(), Some(tone(1.0, 0.3)))
        .with_media("matte.mp4", matte_clip(1.0), None);
    let encoder = RecordingEncoder::default();
    let config = fast_config();
    let baker = Baker::new(&config, &decoder, &encoder);

    let baked = baker.bake(Path::new("subject.mp4"), Path::new("matte.mp4")).unwrap();
    assert_eq!(baked.frame_count(), 30);
    assert_eq!(baked.info().size(), (64, 36));
    for index in [0, 29] {
        let frame = baked.frame(index).unwrap();
        assert_close(frame.get_pixel(32, 18), SKIN);
        assert_close(frame.get_pixel(2, 2), GREEN);
        assert_close(frame.get_pixel(60, 33), GREEN);
    }

    // The baked footage keys cleanly back to the subject
    let keyed = ChromaKey::new(config.chroma.clone()).unwrap().segment(&baked).unwrap();
    let matte = keyed.matte().frame(0).unwrap();
    assert!(matte.get(32, 18) > 0.99);
    assert!(matte.get(2, 2) < 0.01);

    let output = Path::new("out/subject_green.mp4");
    let encoded = baker.run(Path::new("subject.mp4"), Path::new("matte.mp4"), output).unwrap();
    assert_eq!(encoded.frame_count, 30);
    let seen = encoder.encoded.lock().unwrap();
    assert_eq!(seen[0].0, output.to_path_buf());
    assert_eq!(seen[0].2, 0.0);
}

#[test]
fn test_bake_rejects_matte_of_other_length() {
    let decoder = FakeDecoder::default()
        .with_media("subject.mp4", subject_clip(), None)
        .with_media("matte.mp4", matte_clip(2.0), None);
    let encoder = RecordingEncoder::default();
    let config = fast_config();

    let err = Baker::new(&config, &decoder, &encoder)
        .run(Path::new("subject.mp4"), Path::new("matte.mp4"), Path::new("out/x.mp4"))
        .unwrap_err();
    assert!(matches!(
        err,
        CompositorError::Video(VideoError::DimensionMismatch { .. })
    ));
    assert!(encoder.encoded.lock().unwrap().is_empty());
}
