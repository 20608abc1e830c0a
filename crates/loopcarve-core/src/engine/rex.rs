//! Decoder engine backed by the vendor REX shared library, loaded at runtime.
//!
//! The library must export the flat C entry points of the REX SDK
//! (`REXInitializeDLL`, `REXCreate`, `REXRenderSlice`, ...). Nothing is
//! linked at build time.

use std::{
    ffi::{c_char, c_void},
    mem::size_of,
    path::Path,
    ptr,
};

use libloading::Library;
use tracing::{debug, info, instrument};

use super::{DecoderEngine, EngineError, LoopDecoder, PreviewStage};
use crate::{
    model::{LoopInfo, SliceInfo},
    pcm::PlanarBuffer,
};

const REX_NO_ERROR: i32 = 1;

/// Library file name tried when no path is configured.
#[cfg(target_os = "windows")]
pub const DEFAULT_LIBRARY_NAME: &str = "REX Shared Library.dll";
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY_NAME: &str = "libREXSharedLibrary.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DEFAULT_LIBRARY_NAME: &str = "libREXSharedLibrary.so";

// Mirrors the SDK layout; only some fields are consumed.
#[allow(dead_code)]
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct RexInfo {
    channels: i32,
    sample_rate: i32,
    slice_count: i32,
    tempo: i32,
    original_tempo: i32,
    ppq_length: i32,
    time_sign_nom: i32,
    time_sign_denom: i32,
    bit_depth: i32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct RexSliceInfo {
    ppq_position: i32,
    sample_length: i32,
}

type RexHandle = *mut c_void;
type CreateCallback = Option<unsafe extern "C" fn(i32, *mut c_void) -> i32>;

type InitializeFn = unsafe extern "C" fn() -> i32;
type UninitializeFn = unsafe extern "C" fn();
type CreateFn =
    unsafe extern "C" fn(*mut RexHandle, *const c_char, i32, CreateCallback, *mut c_void) -> i32;
type DeleteFn = unsafe extern "C" fn(*mut RexHandle);
type GetInfoFn = unsafe extern "C" fn(RexHandle, i32, *mut RexInfo) -> i32;
type GetSliceInfoFn = unsafe extern "C" fn(RexHandle, i32, i32, *mut RexSliceInfo) -> i32;
type RenderSliceFn = unsafe extern "C" fn(RexHandle, i32, i32, *mut *mut f32) -> i32;
type PreviewFn = unsafe extern "C" fn(RexHandle) -> i32;
type RenderPreviewFn = unsafe extern "C" fn(RexHandle, i32, *mut *mut f32) -> i32;

#[derive(Clone, Copy)]
struct RexApi {
    initialize: InitializeFn,
    uninitialize: UninitializeFn,
    create: CreateFn,
    delete: DeleteFn,
    get_info: GetInfoFn,
    get_slice_info: GetSliceInfoFn,
    render_slice: RenderSliceFn,
    start_preview: PreviewFn,
    stop_preview: PreviewFn,
    render_preview: RenderPreviewFn,
}

impl RexApi {
    fn resolve(library: &Library) -> Result<Self, EngineError> {
        Ok(Self {
            initialize: symbol(library, b"REXInitializeDLL\0")?,
            uninitialize: symbol(library, b"REXUninitializeDLL\0")?,
            create: symbol(library, b"REXCreate\0")?,
            delete: symbol(library, b"REXDelete\0")?,
            get_info: symbol(library, b"REXGetInfo\0")?,
            get_slice_info: symbol(library, b"REXGetSliceInfo\0")?,
            render_slice: symbol(library, b"REXRenderSlice\0")?,
            start_preview: symbol(library, b"REXStartPreview\0")?,
            stop_preview: symbol(library, b"REXStopPreview\0")?,
            render_preview: symbol(library, b"REXRenderPreviewBatch\0")?,
        })
    }
}

fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T, EngineError> {
    // SAFETY: every caller pairs `name` with the signature declared by the SDK.
    unsafe { library.get::<T>(name) }
        .map(|symbol| *symbol)
        .map_err(|error| {
            let name = String::from_utf8_lossy(name);
            EngineError::Unavailable(format!(
                "missing symbol {}: {error}",
                name.trim_end_matches('\0')
            ))
        })
}

/// Human-readable text for an SDK result code.
#[must_use]
pub fn describe_code(code: i32) -> String {
    let text = match code {
        1 => "no error",
        2 => "operation aborted by user",
        3 => "no creator info available",
        100 => "not enough memory for engine",
        101 => "unable to load engine",
        102 => "engine too old",
        103 => "engine not found",
        104 => "api too old",
        105 => "out of memory",
        106 => "file corrupt",
        107 => "file format too new",
        108 => "file has zero loop length",
        200 => "engine not initialised",
        201 => "engine already initialised",
        202 => "invalid handle",
        203 => "invalid size",
        204 => "invalid argument",
        205 => "invalid slice",
        206 => "invalid sample rate",
        207 => "buffer too small",
        208 => "loop is being previewed",
        209 => "loop is not being previewed",
        210 => "invalid tempo",
        _ => "undefined error",
    };
    format!("{text} (code {code})")
}

fn check(code: i32) -> Result<(), String> {
    if code == REX_NO_ERROR {
        Ok(())
    } else {
        Err(describe_code(code))
    }
}

fn non_negative<T: TryFrom<i32>>(value: i32, field: &str) -> Result<T, String> {
    T::try_from(value).map_err(|_| format!("engine reported invalid {field}: {value}"))
}

/// An initialised REX engine. Dropping it uninitialises the engine before
/// the library is unloaded.
pub struct RexEngine {
    api: RexApi,
    _library: Library,
}

impl RexEngine {
    #[instrument(fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        // SAFETY: loading runs the library's static initialisers; the path is
        // operator supplied and expected to be the vendor engine.
        let library = unsafe { Library::new(path) }
            .map_err(|error| EngineError::Unavailable(format!("{}: {error}", path.display())))?;
        let api = RexApi::resolve(&library)?;

        // SAFETY: first call into the freshly loaded library.
        check(unsafe { (api.initialize)() }).map_err(EngineError::Init)?;
        info!("rex engine initialised");

        Ok(Self {
            api,
            _library: library,
        })
    }
}

impl Drop for RexEngine {
    fn drop(&mut self) {
        // SAFETY: every loop borrows the engine, so none is still open here.
        unsafe { (self.api.uninitialize)() };
        debug!("rex engine uninitialised");
    }
}

impl DecoderEngine for RexEngine {
    type Loop<'e> = RexLoop<'e>;

    fn name(&self) -> &'static str {
        "rex"
    }

    fn open<'e>(&'e self, container: &[u8]) -> Result<RexLoop<'e>, EngineError> {
        let size = i32::try_from(container.len())
            .map_err(|_| EngineError::Open("container exceeds 2 GiB".to_string()))?;

        let mut rex_loop = RexLoop {
            api: &self.api,
            handle: ptr::null_mut(),
        };
        // SAFETY: `container` stays valid for the duration of the call and the
        // engine copies what it keeps. No progress callback is installed.
        let code = unsafe {
            (self.api.create)(
                &raw mut rex_loop.handle,
                container.as_ptr().cast::<c_char>(),
                size,
                None,
                ptr::null_mut(),
            )
        };
        check(code).map_err(EngineError::Open)?;
        Ok(rex_loop)
    }
}

pub struct RexLoop<'e> {
    api: &'e RexApi,
    handle: RexHandle,
}

impl RexLoop<'_> {
    fn channel_pointers(output: &mut PlanarBuffer) -> Result<(i32, [*mut f32; 2]), String> {
        let frames = i32::try_from(output.frames())
            .map_err(|_| format!("{} frames exceed the engine's range", output.frames()))?;
        let mut pointers = [ptr::null_mut::<f32>(); 2];
        for (slot, channel) in pointers.iter_mut().zip(output.channels_mut()) {
            *slot = channel.as_mut_ptr();
        }
        Ok((frames, pointers))
    }
}

impl Drop for RexLoop<'_> {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            // SAFETY: the handle came from REXCreate and is released exactly once.
            unsafe { (self.api.delete)(&raw mut self.handle) };
        }
    }
}

impl LoopDecoder for RexLoop<'_> {
    fn loop_info(&self) -> Result<LoopInfo, EngineError> {
        let mut info = RexInfo::default();
        // SAFETY: `info` matches the SDK struct layout and its size is passed along.
        let code =
            unsafe { (self.api.get_info)(self.handle, size_of::<RexInfo>() as i32, &raw mut info) };
        check(code).map_err(EngineError::LoopInfo)?;

        let convert = || -> Result<LoopInfo, String> {
            Ok(LoopInfo {
                sample_rate: non_negative(info.sample_rate, "sample rate")?,
                channels: non_negative(info.channels, "channel count")?,
                slice_count: non_negative(info.slice_count, "slice count")?,
                tempo_milli_bpm: non_negative(info.tempo, "tempo")?,
                ppq_length: non_negative(info.ppq_length, "ppq length")?,
            })
        };
        convert().map_err(EngineError::LoopInfo)
    }

    fn slice_info(&self, index: u32) -> Result<SliceInfo, EngineError> {
        let failed = |reason: String| EngineError::SliceInfo { index, reason };
        let raw_index = i32::try_from(index).map_err(|_| failed("index out of range".into()))?;

        let mut info = RexSliceInfo::default();
        // SAFETY: `info` matches the SDK struct layout and its size is passed along.
        let code = unsafe {
            (self.api.get_slice_info)(
                self.handle,
                raw_index,
                size_of::<RexSliceInfo>() as i32,
                &raw mut info,
            )
        };
        check(code).map_err(failed)?;

        Ok(SliceInfo {
            index,
            ppq_position: non_negative(info.ppq_position, "ppq position").map_err(failed)?,
            frames: non_negative(info.sample_length, "sample length").map_err(failed)?,
        })
    }

    fn render_slice(&mut self, index: u32, output: &mut PlanarBuffer) -> Result<(), EngineError> {
        let failed = |reason: String| EngineError::RenderSlice { index, reason };
        let raw_index = i32::try_from(index).map_err(|_| failed("index out of range".into()))?;
        let (frames, mut pointers) = Self::channel_pointers(output).map_err(failed)?;

        // SAFETY: each non-null pointer addresses `frames` writable floats owned
        // by `output`; the right pointer is null for mono loops.
        let code = unsafe {
            (self.api.render_slice)(self.handle, raw_index, frames, pointers.as_mut_ptr())
        };
        check(code).map_err(failed)
    }

    fn start_preview(&mut self) -> Result<(), EngineError> {
        // SAFETY: valid handle, no buffers involved.
        let code = unsafe { (self.api.start_preview)(self.handle) };
        check(code).map_err(|reason| EngineError::Preview {
            stage: PreviewStage::Start,
            reason,
        })
    }

    fn render_preview_chunk(&mut self, output: &mut PlanarBuffer) -> Result<(), EngineError> {
        let failed = |reason: String| EngineError::Preview {
            stage: PreviewStage::Render,
            reason,
        };
        let (frames, mut pointers) = Self::channel_pointers(output).map_err(failed)?;

        // SAFETY: as in `render_slice`.
        let code =
            unsafe { (self.api.render_preview)(self.handle, frames, pointers.as_mut_ptr()) };
        check(code).map_err(failed)
    }

    fn stop_preview(&mut self) -> Result<(), EngineError> {
        // SAFETY: valid handle, no buffers involved.
        let code = unsafe { (self.api.stop_preview)(self.handle) };
        check(code).map_err(|reason| EngineError::Preview {
            stage: PreviewStage::Stop,
            reason,
        })
    }
}
