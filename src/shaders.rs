// Shader sources - lookup, GLSL -> SPIR-V compilation, hot reload
//
// Materials name their shaders logically ("ui"); a `ShaderSource` resolves
// `(name, stage)` to GLSL text plus a path hint for diagnostics. The on-disk
// directory wins over the embedded built-ins so shaders can be edited live.

use crate::resources::ShaderStage;
use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// GLSL text and where it came from
#[derive(Debug, Clone)]
pub struct ShaderCode {
    pub source: Cow<'static, str>,
    pub path_hint: String,
}

/// Shader source provider
pub trait ShaderSource {
    fn load(&self, name: &str, stage: ShaderStage) -> Result<ShaderCode>;
}

/// Shaders compiled into the binary
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedShaders;

impl EmbeddedShaders {
    fn lookup(name: &str, stage: ShaderStage) -> Option<&'static str> {
        match (name, stage) {
            ("ui", ShaderStage::Vertex) => Some(include_str!("../shaders/ui.vert")),
            ("ui", ShaderStage::Fragment) => Some(include_str!("../shaders/ui.frag")),
            _ => None,
        }
    }
}

impl ShaderSource for EmbeddedShaders {
    fn load(&self, name: &str, stage: ShaderStage) -> Result<ShaderCode> {
        let source = Self::lookup(name, stage).with_context(|| {
            format!("No embedded shader '{}' for stage {:?}", name, stage)
        })?;

        Ok(ShaderCode {
            source: Cow::Borrowed(source),
            path_hint: format!("<embedded>/{}.{}", name, stage.extension()),
        })
    }
}

/// Shaders read from `<root>/<name>.<vert|frag>`
#[derive(Debug, Clone)]
pub struct DirectoryShaders {
    root: PathBuf,
}

impl DirectoryShaders {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str, stage: ShaderStage) -> PathBuf {
        self.root.join(format!("{}.{}", name, stage.extension()))
    }
}

impl ShaderSource for DirectoryShaders {
    fn load(&self, name: &str, stage: ShaderStage) -> Result<ShaderCode> {
        let path = self.path_for(name, stage);
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read shader {:?}", path))?;

        Ok(ShaderCode {
            source: Cow::Owned(source),
            path_hint: path.display().to_string(),
        })
    }
}

/// Directory override with embedded fallback
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    directory: Option<DirectoryShaders>,
    embedded: EmbeddedShaders,
}

impl ShaderLibrary {
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self {
            directory: directory.map(DirectoryShaders::new),
            embedded: EmbeddedShaders,
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_ref().map(DirectoryShaders::root)
    }
}

impl ShaderSource for ShaderLibrary {
    fn load(&self, name: &str, stage: ShaderStage) -> Result<ShaderCode> {
        if let Some(directory) = &self.directory {
            if directory.path_for(name, stage).is_file() {
                return directory.load(name, stage);
            }
        }
        self.embedded.load(name, stage)
    }
}

/// Compile GLSL to SPIR-V words for the given stage
pub fn compile_glsl(code: &ShaderCode, stage: ShaderStage) -> Result<Vec<u32>> {
    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };

    let mut frontend = naga::front::glsl::Frontend::default();
    let module = frontend
        .parse(&naga::front::glsl::Options::from(naga_stage), &code.source)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {:?}", code.path_hint, e))?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow::anyhow!("Failed to validate {}: {:?}", code.path_hint, e))?;

    // GLSL written for Vulkan already uses Vulkan clip space
    let mut options = naga::back::spv::Options::default();
    options
        .flags
        .remove(naga::back::spv::WriterFlags::ADJUST_COORDINATE_SPACE);

    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: naga_stage,
        entry_point: "main".to_string(),
    };

    let words = naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
        .map_err(|e| anyhow::anyhow!("Failed to emit SPIR-V for {}: {:?}", code.path_hint, e))?;

    log::debug!("Compiled {} ({} words)", code.path_hint, words.len());
    Ok(words)
}

/// Collects names of shaders whose files changed on disk
pub struct ShaderWatcher {
    _watcher: RecommendedWatcher,
    changed: Arc<Mutex<BTreeSet<String>>>,
}

impl ShaderWatcher {
    pub fn new(directory: &Path) -> Result<Self> {
        let changed = Arc::new(Mutex::new(BTreeSet::new()));
        let sink = Arc::clone(&changed);

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) => {
                    let mut changed = sink.lock();
                    changed.extend(event.paths.iter().filter_map(|path| shader_name(path)));
                }
                Ok(_) => {}
                Err(e) => log::warn!("Shader watcher error: {}", e),
            }
        })
        .context("Failed to create shader watcher")?;

        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", directory))?;

        log::info!("Watching {:?} for shader changes", directory);

        Ok(Self {
            _watcher: watcher,
            changed,
        })
    }

    /// Take every shader name reported since the previous call
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.changed.lock()).into_iter().collect()
    }
}

/// Logical shader name of a watched file, if it is a shader at all
fn shader_name(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?;
    ShaderStage::from_extension(extension)?;
    Some(path.file_stem()?.to_str()?.to_string())
}
