use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use citymodel::merge;
use geodesy::{
    BoundingBox, DEFAULT_GRID_URL, FileGridSource, GeoConverter, GridSource, HttpGridSource,
};
use serde_json::json;
use solar::{sun_angles, sun_light};
use tiles::{CancelFlag, FetchConfig, HttpPageSource, TileFetcher};
use tracing_subscriber::EnvFilter;

mod timestamp;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<(), String> {
    let mut args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(usage());
    }

    let cmd = args[1].clone();
    args.drain(0..2);

    match cmd.as_str() {
        "aggregate" => cmd_aggregate(args).await,
        "project" => cmd_project(args).await,
        "sun" => cmd_sun(args),
        _ => Err(usage()),
    }
}

async fn cmd_aggregate(args: Vec<String>) -> Result<(), String> {
    // citymerge aggregate --lat L --long G [--half-width M] [--limit N]
    //   [--page-limit K] [--delay-ms D] [--grid-file PATH] [--prune] [--out FILE]
    let mut lat: Option<f64> = None;
    let mut long: Option<f64> = None;
    let mut half_width = 100.0_f64;
    let mut grid_file: Option<String> = None;
    let mut prune = false;
    let mut out: Option<PathBuf> = None;

    let mut config = FetchConfig::default();
    if let Ok(base_url) = env::var("BAG_API_URL") {
        config.base_url = base_url;
    }

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--lat" => lat = Some(take_f64(&args, &mut i, "--lat")?),
            "--long" => long = Some(take_f64(&args, &mut i, "--long")?),
            "--half-width" => half_width = take_f64(&args, &mut i, "--half-width")?,
            "--limit" => config.page_size = take_usize(&args, &mut i, "--limit")?,
            "--page-limit" => config.page_limit = take_usize(&args, &mut i, "--page-limit")?,
            "--delay-ms" => {
                config.page_delay =
                    Duration::from_millis(take_usize(&args, &mut i, "--delay-ms")? as u64)
            }
            "--grid-file" => grid_file = Some(take_value(&args, &mut i, "--grid-file")?),
            "--prune" => prune = true,
            "--out" => out = Some(PathBuf::from(take_value(&args, &mut i, "--out")?)),
            other => {
                return Err(format!("unknown arg: {other}\n\n{}", usage()));
            }
        }
        i += 1;
    }

    let lat = lat.ok_or_else(|| "aggregate requires --lat".to_string())?;
    let long = long.ok_or_else(|| "aggregate requires --long".to_string())?;

    let converter = GeoConverter::new(grid_source(grid_file));
    let (x, y) = converter
        .lat_long_to_planar(lat, long)
        .await
        .map_err(|e| e.to_string())?;
    let bbox = BoundingBox::around(x, y, half_width);
    eprintln!("target ({lat}, {long}) -> RD ({x:.3}, {y:.3}), bbox {bbox}");

    let source =
        HttpPageSource::new(REQUEST_TIMEOUT).map_err(|e| format!("http client setup: {e}"))?;
    let fetcher = TileFetcher::new(Box::new(source), config);
    let collection = fetcher
        .fetch_all_pages(bbox, &CancelFlag::new())
        .await
        .map_err(|e| e.to_string())?;
    eprintln!("fetched {} features", collection.features.len());

    let (mut document, stats) = merge(collection).map_err(|e| e.to_string())?;
    eprintln!(
        "merged {} objects from {} features ({} skipped, {} duplicates), {} vertices",
        stats.merged_objects,
        stats.ingested_features,
        stats.skipped_features,
        stats.duplicate_objects,
        stats.vertex_count
    );

    if prune {
        let pruned = document
            .prune_unreferenced_vertices()
            .map_err(|e| e.to_string())?;
        eprintln!(
            "pruned {} unreferenced vertices, {} retained",
            pruned.removed_vertices, pruned.retained_vertices
        );
    }

    let payload = serde_json::to_string_pretty(&document).map_err(|e| format!("json: {e}"))?;
    match out {
        Some(path) => {
            fs::write(&path, payload).map_err(|e| format!("write {path:?}: {e}"))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{payload}"),
    }

    Ok(())
}

async fn cmd_project(args: Vec<String>) -> Result<(), String> {
    // citymerge project --lat L --long G [--grid-file PATH]
    let mut lat: Option<f64> = None;
    let mut long: Option<f64> = None;
    let mut grid_file: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--lat" => lat = Some(take_f64(&args, &mut i, "--lat")?),
            "--long" => long = Some(take_f64(&args, &mut i, "--long")?),
            "--grid-file" => grid_file = Some(take_value(&args, &mut i, "--grid-file")?),
            other => {
                return Err(format!("unknown arg: {other}\n\n{}", usage()));
            }
        }
        i += 1;
    }

    let lat = lat.ok_or_else(|| "project requires --lat".to_string())?;
    let long = long.ok_or_else(|| "project requires --long".to_string())?;

    let converter = GeoConverter::new(grid_source(grid_file));
    let (x, y) = converter
        .lat_long_to_planar(lat, long)
        .await
        .map_err(|e| e.to_string())?;
    let (back_lat, back_long) = converter
        .planar_to_lat_long(x, y)
        .await
        .map_err(|e| e.to_string())?;

    println!("RD x={x:.3} y={y:.3}");
    println!("round trip lat={back_lat:.7} long={back_long:.7}");
    Ok(())
}

fn cmd_sun(args: Vec<String>) -> Result<(), String> {
    // citymerge sun --lat L --long G --time YYYY-MM-DDTHH:MM:SSZ [--distance D]
    let mut lat: Option<f64> = None;
    let mut long: Option<f64> = None;
    let mut time: Option<String> = None;
    let mut distance = 30.0_f64;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--lat" => lat = Some(take_f64(&args, &mut i, "--lat")?),
            "--long" => long = Some(take_f64(&args, &mut i, "--long")?),
            "--time" => time = Some(take_value(&args, &mut i, "--time")?),
            "--distance" => distance = take_f64(&args, &mut i, "--distance")?,
            other => {
                return Err(format!("unknown arg: {other}\n\n{}", usage()));
            }
        }
        i += 1;
    }

    let lat = lat.ok_or_else(|| "sun requires --lat".to_string())?;
    let long = long.ok_or_else(|| "sun requires --long".to_string())?;
    let time = time.ok_or_else(|| "sun requires --time".to_string())?;
    let time = timestamp::parse_utc_timestamp(&time)?;

    let angles = sun_angles(time, lat, long);
    let light = sun_light(angles, distance);
    let payload = json!({
        "azimuth": angles.azimuth,
        "altitude": angles.altitude,
        "position": light.position,
        "intensity": light.intensity,
        "visible": light.visible,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).map_err(|e| format!("json: {e}"))?
    );
    Ok(())
}

fn grid_source(grid_file: Option<String>) -> Box<dyn GridSource> {
    match grid_file {
        Some(path) => Box::new(FileGridSource::new(path)),
        None => {
            let url = env::var("RDNAP_GRID_URL").unwrap_or_else(|_| DEFAULT_GRID_URL.to_string());
            Box::new(HttpGridSource::new(url))
        }
    }
}

fn take_value(args: &[String], i: &mut usize, flag: &str) -> Result<String, String> {
    *i += 1;
    if *i >= args.len() {
        return Err(format!("{flag} requires a value"));
    }
    Ok(args[*i].clone())
}

fn take_f64(args: &[String], i: &mut usize, flag: &str) -> Result<f64, String> {
    take_value(args, i, flag)?
        .parse::<f64>()
        .map_err(|_| format!("{flag} must be a number"))
}

fn take_usize(args: &[String], i: &mut usize, flag: &str) -> Result<usize, String> {
    take_value(args, i, flag)?
        .parse::<usize>()
        .map_err(|_| format!("{flag} must be an integer"))
}

fn usage() -> String {
    let exe = env::args().next().unwrap_or_else(|| "citymerge".to_string());
    format!(
        "Usage:\n  {exe} aggregate --lat L --long G [--half-width M] [--limit N] [--page-limit K] [--delay-ms D] [--grid-file PATH] [--prune] [--out FILE]\n  {exe} project --lat L --long G [--grid-file PATH]\n  {exe} sun --lat L --long G --time YYYY-MM-DDTHH:MM:SSZ [--distance D]\n\nNotes:\n- aggregate writes the merged CityJSON document to --out, or stdout without it.\n- BAG_API_URL overrides the feature collection endpoint.\n- RDNAP_GRID_URL overrides the datum grid URL; --grid-file reads it from disk instead.\n"
    )
}
