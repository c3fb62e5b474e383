//! World BSP demo: load datafile, build BSP and portals, evaluate visibility from a camera

use std::path::PathBuf;

use clap::Parser;
use world_bsp::{
    frustum::Frustum,
    math::Vec3f,
    bsp::DrawRange,
    RenderFlags, World, WorldConfig,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(name = "world-bsp", about = "Build BSP/portal world and evaluate visibility")]
struct Args {
    /// World datafile
    map: PathBuf,

    /// Datafile position scale
    #[clap(long, default_value = "1.0")]
    scale: f32,

    /// Camera location (`x,y,z`), world bound box center by default
    #[clap(long, parse(try_from_str = parse_vec3))]
    eye: Option<Vec3f>,

    /// Camera direction (`x,y,z`)
    #[clap(long, parse(try_from_str = parse_vec3), default_value = "1,0,0")]
    direction: Vec3f,

    /// Vertical field of view (degrees)
    #[clap(long, default_value = "60")]
    fov: f32,

    /// PVS portal chain length limit
    #[clap(long, default_value = "64")]
    max_portal_depth: usize,

    /// Enable render flag by name (e.g. `debug_portals`)
    #[clap(long)]
    enable: Vec<String>,

    /// Disable render flag by name (e.g. `build_bsp_tree`)
    #[clap(long)]
    disable: Vec<String>,
}

/// Parse `x,y,z` vector
fn parse_vec3(s: &str) -> Result<Vec3f, String> {
    let components = s
        .split(',')
        .map(|component| component.trim().parse::<f32>().map_err(|error| format!("\"{}\": {}", component, error)))
        .collect::<Result<Vec<_>, _>>()?;

    match components.as_slice() {
        [x, y, z] => Ok(Vec3f::new(*x, *y, *z)),
        _ => Err(format!("expected 3 components, got {}", components.len())),
    }
}

fn find_flag(name: &str) -> Result<RenderFlags, String> {
    RenderFlags::find(name).ok_or_else(|| format!("unknown render flag \"{}\"", name))
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut flags = RenderFlags::default();

    for name in &args.enable {
        flags.insert(find_flag(name)?);
    }

    for name in &args.disable {
        flags.remove(find_flag(name)?);
    }

    let config = WorldConfig::default()
        .with_flags(flags)
        .with_scale(args.scale)
        .with_max_portal_depth(args.max_portal_depth);

    let load_start = std::time::Instant::now();
    let mut world = World::load_datafile(&args.map, config)?;
    log::info!("world loaded in {:?}", load_start.elapsed());

    let stats = world.stats();
    let pool_stats = world.pool_stats();

    println!("BSP Stat:");
    println!("    Triangles   : {} ({} degenerate)", stats.input_triangles, stats.degenerate_triangles);
    println!("    Partitions  : {}", world.partition_nodes().len());
    println!("    Leaves      : {}", world.leaf_nodes().len());
    println!("    Depth       : {}", world.depth());
    println!("    Polygons    : {} ({} fragments)", pool_stats.polygons.objects_alive, stats.fragments_created);
    println!("    Splits      : {} spanning, {} on plane", stats.polygons_spanning, stats.polygons_on_plane);
    println!("    Portals     : {} ({} seeds, {} spurious, {} extra, {} unpaired, {} lost)",
        world.portal_count(),
        stats.seed_portals,
        stats.spurious_portals,
        stats.extra_portals,
        stats.unpaired_portals,
        stats.portals_lost,
    );
    println!("    Vertices    : {} ({} bytes)", world.vertices().len(), world.vertex_bytes().len());

    let bound_box = world.bound_box();
    let eye = args.eye.unwrap_or((bound_box.min() + bound_box.max()) * 0.5);

    let up = if (args.direction.normalized() ^ Vec3f::new(0.0, 0.0, 1.0)).abs() > 0.99 {
        Vec3f::new(0.0, 1.0, 0.0)
    } else {
        Vec3f::new(0.0, 0.0, 1.0)
    };

    let far = bound_box.size().length().max(1.0) * 2.0;
    let frustum = Frustum::perspective(eye, args.direction, up, args.fov.to_radians(), 1.0, 0.1, far);

    let visible_leaves = world.update_visibility(eye, &frustum);

    let mut draws = Vec::<DrawRange>::new();
    let render_stats = world.render(eye, &mut draws);

    println!("Frame:");
    match visible_leaves {
        Some(count) => println!("    Visible     : {} of {} leaves", count, world.leaf_nodes().len()),
        None => println!("    Visible     : camera is outside of BSP"),
    }
    println!("    Polygons    : {}", render_stats.polygons_rendered);
    println!("    Lists       : {}", render_stats.polygon_lists_rendered);
    println!("    Draw calls  : {}", render_stats.draw_calls);

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(error) = run(Args::parse()) {
        log::error!("{}", error);
        std::process::exit(1);
    }
}
