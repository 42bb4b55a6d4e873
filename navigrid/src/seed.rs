//! `navigrid seed`: build a one-floor registry from floorplan annotations.

use crate::flag_value;
use navigrid_core::landmark::FloorId;
use navigrid_core::seed::{load_annotations, registry_from_annotations, write_registry, ImageSize};
use std::path::PathBuf;

struct SeedOptions {
    annotations: PathBuf,
    floor: FloorId,
    image: ImageSize,
    out: PathBuf,
}

fn parse_seed_options(args: &[String]) -> Result<SeedOptions, Box<dyn std::error::Error>> {
    let mut annotations = None;
    let mut floor = None;
    let mut image = None;
    let mut out = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--annotations" => annotations = Some(PathBuf::from(flag_value(args, &mut i)?)),
            "--floor" => floor = Some(FloorId::new(flag_value(args, &mut i)?)),
            "--image-size" => image = Some(flag_value(args, &mut i)?.parse::<ImageSize>()?),
            "--out" => out = Some(PathBuf::from(flag_value(args, &mut i)?)),
            other => return Err(format!("unknown seed argument '{other}'").into()),
        }
        i += 1;
    }

    let missing = |flag: &str| format!("seed needs {flag}");
    Ok(SeedOptions {
        annotations: annotations.ok_or_else(|| missing("--annotations"))?,
        floor: floor.ok_or_else(|| missing("--floor"))?,
        image: image.ok_or_else(|| missing("--image-size"))?,
        out: out.ok_or_else(|| missing("--out"))?,
    })
}

pub async fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let options = parse_seed_options(args)?;

    let annotations = load_annotations(&options.annotations).await?;
    let registry = registry_from_annotations(&annotations, options.image, &options.floor)?;
    write_registry(&registry, &options.out).await?;

    println!(
        "[SEEDED] {} nodes on floor {} -> {}",
        registry.nodes.len(),
        options.floor,
        options.out.display()
    );
    Ok(())
}
