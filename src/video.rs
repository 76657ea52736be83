// video.rs — 视频帧来源
//
// 解码在后台线程进行（同 start_load_image 的做法），结果写进 FrameSlot。
// 渲染线程每帧只读取"最新一帧"：后写覆盖先写，没有丢帧/补帧策略。

use crate::error::{Result, ViewerError};
use image::io::Reader as ImageReader;
use image::{GenericImage, Rgba, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

#[derive(Default)]
struct SlotState {
    frame: Option<Arc<RgbaImage>>,
    generation: u64,
}

/// 最新解码帧的共享槽位。克隆得到的是同一个槽位的句柄。
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    // 解码线程 panic 后锁会中毒；槽位里的数据仍然完整，直接接着用
    fn state(&self) -> MutexGuard<'_, SlotState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn publish(&self, frame: RgbaImage) -> u64 {
        let mut state = self.state();
        state.generation += 1;
        state.frame = Some(Arc::new(frame));
        state.generation
    }

    /// 返回 (generation, frame)；尚未收到任何帧时为 None
    pub fn latest(&self) -> Option<(u64, Arc<RgbaImage>)> {
        let state = self.state();
        state.frame.as_ref().map(|f| (state.generation, Arc::clone(f)))
    }

    pub fn generation(&self) -> u64 {
        self.state().generation
    }
}

impl std::fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSlot")
            .field("generation", &self.generation())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlaybackOptions {
    pub frame_rate: f32,
    pub looping: bool,
    /// GPU 单张纹理的最大边长
    pub max_dimension: u32,
}

/// 后台播放线程。drop 时停止并等待线程退出。
pub struct Playback {
    source: PathBuf,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Playback {
    /// `path` 为单张全景图或帧目录（按文件名排序播放）
    pub fn open(path: &Path, options: PlaybackOptions, slot: FrameSlot) -> Result<Self> {
        let frames = if path.is_dir() {
            list_frames(path)?
        } else {
            vec![path.to_path_buf()]
        };

        let stop = Arc::new(AtomicBool::new(false));
        let source = path.to_path_buf();
        log::info!("opening video source {} ({} frames)", source.display(), frames.len());

        let thread = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("frame-decoder".into())
                .spawn(move || run_decoder(frames, options, slot, stop))
                .map_err(|source| ViewerError::VideoIo {
                    path: path.to_path_buf(),
                    source,
                })?
        };

        Ok(Self {
            source,
            stop,
            thread: Some(thread),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// 目录下所有图片文件，按文件名排序
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_err = |source| ViewerError::VideoIo {
        path: dir.to_path_buf(),
        source,
    };

    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_frame = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_frame && path.is_file() {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

pub fn decode_frame(path: &Path) -> Result<RgbaImage> {
    let file = File::open(path).map_err(|source| ViewerError::VideoIo {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let img = ImageReader::new(reader)
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|mut r| {
            r.no_limits();
            r.decode()
        })
        .map_err(|source| ViewerError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(img.to_rgba8())
}

/// 上传前的整理：
/// - 超过 GPU 限制时等比缩小到限制内
/// - 高度不足 宽/2 时在顶部补黑，把原图贴到底部（非 2:1 的全景图）
pub fn prepare_frame(img: RgbaImage, max_dimension: u32) -> RgbaImage {
    let (src_w, src_h) = img.dimensions();

    let img = if max_dimension > 0 && (src_w > max_dimension || src_h > max_dimension) {
        let scale = (max_dimension as f32 / src_w.max(src_h) as f32).min(1.0);
        let new_w = ((src_w as f32 * scale) as u32).clamp(1, max_dimension);
        let new_h = ((src_h as f32 * scale) as u32).clamp(1, max_dimension);
        log::debug!("frame {src_w}x{src_h} exceeds {max_dimension}, scaling to {new_w}x{new_h}");
        image::imageops::resize(&img, new_w, new_h, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    let (w, h) = img.dimensions();
    let target_h = w / 2;
    if target_h > 0 && h < target_h {
        let mut canvas = RgbaImage::from_pixel(w, target_h, Rgba([0, 0, 0, 255]));
        // y_offset 保证不越界
        let _ = canvas.copy_from(&img, 0, target_h - h);
        canvas
    } else {
        img
    }
}

fn run_decoder(frames: Vec<PathBuf>, options: PlaybackOptions, slot: FrameSlot, stop: Arc<AtomicBool>) {
    if frames.is_empty() {
        log::warn!("video source has no frames");
        return;
    }

    let frame_time = Duration::from_secs_f32(1.0 / options.frame_rate.max(0.001));
    let mut next_deadline = Instant::now();
    let mut failed = 0usize;

    'playback: loop {
        for path in &frames {
            if stop.load(Ordering::Relaxed) {
                break 'playback;
            }

            match decode_frame(path) {
                Ok(img) => {
                    slot.publish(prepare_frame(img, options.max_dimension));
                    failed = 0;
                }
                Err(e) => {
                    log::warn!("{e}");
                    failed += 1;
                    // 整个序列都解不出来就放弃，避免空转
                    if failed >= frames.len() {
                        break 'playback;
                    }
                    continue;
                }
            }

            // 单张图片不需要计时
            if frames.len() == 1 {
                break 'playback;
            }

            next_deadline += frame_time;
            let now = Instant::now();
            if next_deadline > now {
                sleep_until(next_deadline, &stop);
            } else {
                // 解码跟不上时重新对齐时钟
                next_deadline = now;
            }
        }

        if !options.looping {
            break;
        }
    }

    log::debug!("frame decoder finished");
}

// 分段睡眠，保证 stop 能及时生效
fn sleep_until(deadline: Instant, stop: &AtomicBool) {
    const STEP: Duration = Duration::from_millis(20);
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(STEP));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("panovideo-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn wait_for_generation(slot: &FrameSlot, at_least: u64) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if slot.generation() >= at_least {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn slot_keeps_only_newest_frame() {
        let slot = FrameSlot::new();
        assert!(slot.latest().is_none());

        slot.publish(RgbaImage::from_pixel(2, 1, Rgba([1, 0, 0, 255])));
        let reader = slot.clone();
        slot.publish(RgbaImage::from_pixel(4, 2, Rgba([2, 0, 0, 255])));

        let (generation, frame) = reader.latest().unwrap();
        assert_eq!(generation, 2);
        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(frame.get_pixel(0, 0), &Rgba([2, 0, 0, 255]));
    }

    #[test]
    fn poisoned_slot_keeps_generation_and_frame_in_step() {
        let slot = FrameSlot::new();
        slot.publish(RgbaImage::new(2, 1));

        let writer = slot.clone();
        let _ = thread::spawn(move || {
            let _guard = writer.inner.lock().unwrap();
            panic!("decoder crashed while holding the slot");
        })
        .join();
        assert!(slot.inner.is_poisoned());

        assert_eq!(slot.generation(), 1);
        assert_eq!(slot.latest().map(|(g, _)| g), Some(1));
        assert_eq!(slot.publish(RgbaImage::new(2, 1)), 2);
        assert_eq!(slot.generation(), 2);
    }

    #[test]
    fn short_frames_are_padded_on_top() {
        let img = RgbaImage::from_pixel(8, 2, Rgba([255, 255, 255, 255]));
        let out = prepare_frame(img, 0);
        assert_eq!(out.dimensions(), (8, 4));
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(0, 3), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn oversized_frames_are_scaled_down() {
        let img = RgbaImage::from_pixel(64, 32, Rgba([10, 20, 30, 255]));
        let out = prepare_frame(img, 16);
        assert_eq!(out.dimensions(), (16, 8));
    }

    #[test]
    fn equirect_frames_pass_through() {
        let img = RgbaImage::from_pixel(8, 4, Rgba([9, 9, 9, 255]));
        let out = prepare_frame(img.clone(), 4096);
        assert_eq!(out, img);
    }

    #[test]
    fn frame_listing_is_sorted_and_filtered() {
        let dir = scratch_dir("list");
        for name in ["b.png", "a.png", "notes.txt", "c.JPG"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }
        let frames = list_frames(&dir).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.png", "b.png", "c.JPG"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn still_image_is_published_once() {
        let dir = scratch_dir("still");
        let path = dir.join("pano.png");
        RgbaImage::from_pixel(8, 4, Rgba([0, 128, 0, 255])).save(&path).unwrap();

        let slot = FrameSlot::new();
        let options = PlaybackOptions {
            frame_rate: 30.0,
            looping: true,
            max_dimension: 4096,
        };
        let playback = Playback::open(&path, options, slot.clone()).unwrap();
        assert!(wait_for_generation(&slot, 1));
        let (_, frame) = slot.latest().unwrap();
        assert_eq!(frame.dimensions(), (8, 4));

        drop(playback);
        assert_eq!(slot.generation(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn sequence_loops_until_dropped() {
        let dir = scratch_dir("seq");
        for i in 0..3u8 {
            RgbaImage::from_pixel(4, 2, Rgba([i, 0, 0, 255]))
                .save(dir.join(format!("frame_{i:03}.png")))
                .unwrap();
        }

        let slot = FrameSlot::new();
        let options = PlaybackOptions {
            frame_rate: 200.0,
            looping: true,
            max_dimension: 4096,
        };
        let playback = Playback::open(&dir, options, slot.clone()).unwrap();
        // 超过帧数说明已经回到开头
        assert!(wait_for_generation(&slot, 5));
        drop(playback);

        let stopped_at = slot.generation();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(slot.generation(), stopped_at);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn undecodable_source_fails_silently() {
        let dir = scratch_dir("broken");
        let path = dir.join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let slot = FrameSlot::new();
        let options = PlaybackOptions {
            frame_rate: 30.0,
            looping: true,
            max_dimension: 4096,
        };
        let playback = Playback::open(&path, options, slot.clone()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !playback.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(playback.is_finished());
        assert!(slot.latest().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
