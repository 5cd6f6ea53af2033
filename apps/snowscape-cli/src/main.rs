use anyhow::bail;
use clap::{Parser, Subcommand};
use snowscape_assets::{
    AssetCache, AssetSource, FileSource, HeadlessBackend, MeshData, VertexLayout,
};
use snowscape_render::{DebugTextRenderer, Frame, RenderView, Renderer};
use snowscape_scene::{Scene, SceneConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "snowscape-cli", about = "Headless snowscape tools")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Parse and index an OBJ file, printing its statistics
    Inspect {
        /// Path to the OBJ file
        path: PathBuf,
        /// Also compute tangent frames
        #[arg(long)]
        tangents: bool,
    },
    /// Populate a scene on a headless GPU, step it and tear it down
    Simulate {
        /// Scene config (JSON); the built-in rock field is used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of update steps
        #[arg(short, long, default_value = "10")]
        ticks: u64,
        /// Override the config's placement seed
        #[arg(short, long)]
        seed: Option<u64>,
        /// Directory asset paths are resolved against
        #[arg(long, default_value = ".")]
        asset_root: PathBuf,
    },
}

fn inspect(path: PathBuf, tangents: bool) -> anyhow::Result<()> {
    let mut source = FileSource::default();
    let mesh = source.load_mesh(&path.to_string_lossy())?;
    let layout = if tangents {
        VertexLayout::TangentSpace
    } else {
        VertexLayout::Standard
    };
    let data = MeshData::build(&mesh, layout)?;

    println!("{}", path.display());
    println!(
        "  source:   {} corners, {} triangles",
        mesh.corner_count(),
        mesh.triangle_count()
    );
    println!(
        "  indexed:  {} vertices, {} indices ({:.1}% of corners kept)",
        data.vertex_count(),
        data.index_count(),
        100.0 * data.vertex_count() as f64 / mesh.corner_count() as f64
    );

    let (min, max) = data.positions.iter().fold(
        (data.positions[0], data.positions[0]),
        |(lo, hi), p| (lo.min(*p), hi.max(*p)),
    );
    println!(
        "  bounds:   ({:.3}, {:.3}, {:.3}) .. ({:.3}, {:.3}, {:.3})",
        min.x, min.y, min.z, max.x, max.y, max.z
    );

    if let Some(tangents) = &data.tangents {
        let worst = tangents
            .iter()
            .zip(&data.normals)
            .map(|(t, n)| t.dot(*n).abs())
            .fold(0.0_f32, f32::max);
        println!("  tangents: max |t.n| = {worst:.2e}");
    }
    Ok(())
}

fn simulate(
    config: Option<PathBuf>,
    ticks: u64,
    seed: Option<u64>,
    asset_root: PathBuf,
) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    };
    if let Some(seed) = seed {
        config.seed = seed;
    }

    let mut gpu = HeadlessBackend::new();
    let mut source = FileSource::new(asset_root);
    let mut cache = AssetCache::new();
    let mut scene = Scene::new();

    let report = scene.populate(&config, &mut cache, &mut gpu, &mut source)?;
    println!(
        "Populated {} objects ({} groups skipped)",
        report.spawned,
        report.skipped.len()
    );
    for (mesh, error) in &report.skipped {
        println!("  skipped {mesh}: {error}");
    }

    for _ in 0..ticks {
        scene.advance_all();
    }

    let view = RenderView {
        light_position: config.light_position,
        ..RenderView::default()
    };
    let text = DebugTextRenderer::new().render(
        Frame {
            scene: &scene,
            cache: &cache,
        },
        &view,
    );
    print!("{text}");

    let teardown = snowscape_scene::shutdown(scene, cache, &mut gpu);
    tracing::info!(
        meshes = teardown.meshes,
        textures = teardown.textures,
        buffers_freed = teardown.buffers_freed,
        textures_freed = teardown.textures_freed,
        double_frees = gpu.double_frees(),
        "headless teardown complete"
    );
    println!(
        "Teardown: {} meshes, {} textures, {} buffers freed, {} textures freed",
        teardown.meshes, teardown.textures, teardown.buffers_freed, teardown.textures_freed
    );
    println!(
        "GPU: {} bytes uploaded, {} live buffers, {} live textures, {} double frees",
        gpu.bytes_uploaded(),
        gpu.live_buffers(),
        gpu.live_textures(),
        gpu.double_frees()
    );

    if gpu.live_buffers() + gpu.live_textures() > 0 || gpu.double_frees() > 0 {
        bail!("GPU resources were not released exactly once");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("snowscape-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("assets: {}", snowscape_assets::crate_info());
            println!("scene: {}", snowscape_scene::crate_info());
            println!("render: {}", snowscape_render::crate_info());
            let config = SceneConfig::default();
            println!(
                "default scene: {} groups, {} objects, seed {}",
                config.groups.len(),
                config.object_count(),
                config.seed
            );
        }
        Commands::Inspect { path, tangents } => inspect(path, tangents)?,
        Commands::Simulate {
            config,
            ticks,
            seed,
            asset_root,
        } => simulate(config, ticks, seed, asset_root)?,
    }

    Ok(())
}
