use std::{
    fs::File,
    io::{self, BufWriter, Write},
    sync::Arc,
    time::Instant,
};

use log::info;
use shuttle_core::{
    DurationMatrixProvider, FleetService, GraphHopperProvider, HaversineProvider, HeldKarp,
    MemoryStore, ProviderKind, Result, RouteCache, ServiceOptions, Stop, logging, read_stops,
};

fn main() -> Result<()> {
    let now = Instant::now();
    let options = ServiceOptions::from_args()?;
    logging::init_logger(&options)?;
    info!("options: {options}");

    let stops = read_stops(options.input_path())?;
    info!("input: stops={}", stops.len());
    let store = Arc::new(MemoryStore::with_stops(stops));

    let provider: Arc<dyn DurationMatrixProvider> = match options.provider {
        ProviderKind::Haversine => Arc::new(HaversineProvider::new(options.average_speed_kmh)?),
        ProviderKind::GraphHopper => Arc::new(GraphHopperProvider::new(
            &options.graphhopper_url,
            &options.graphhopper_key,
            options.provider_timeout(),
        )?),
    };
    let solver = Arc::new(HeldKarp::new(2 * options.max_exact_stops)?);
    let routes = Arc::new(RouteCache::new(
        store.clone(),
        provider,
        solver,
        options.open_path_config(),
        options.profile.clone(),
    ));
    let fleet = FleetService::new(
        routes,
        store.clone(),
        store,
        options.lookahead,
        options.lookahead_cache,
    );

    let mut out: Box<dyn Write> = match options.output_path() {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let started = fleet.start(options.vehicle, options.line, options.reverse)?;
    let order = &started.order;
    writeln!(
        out,
        "order line={} version={} stops={} cost={}",
        order.line_id,
        order.version,
        order.stops.len(),
        order.cost
    )?;
    for stop in &order.stops {
        writeln!(out, "{}", stop_line(stop))?;
    }
    let metrics = order.metrics();
    writeln!(
        out,
        "metrics legs={} total_s={:.0} longest_s={:.0} avg_s={:.0}",
        metrics.legs, metrics.total, metrics.longest, metrics.average
    )?;

    writeln!(out, "step=0 {}", preview(&started.lookahead))?;
    for step in 1..=options.advances {
        let lookahead = fleet.advance(options.vehicle)?;
        writeln!(out, "step={step} {}", preview(&lookahead))?;
    }
    fleet.stop_vehicle(options.vehicle)?;
    out.flush()?;

    info!(
        "output: line={} advances={} time={:.2}s",
        options.line,
        options.advances,
        now.elapsed().as_secs_f32()
    );
    Ok(())
}

fn stop_line(stop: &Stop) -> String {
    format!("{},{},{}", stop.id, stop.position, stop.kind)
}

fn preview(stops: &[Stop]) -> String {
    stops
        .iter()
        .map(|s| s.id.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
