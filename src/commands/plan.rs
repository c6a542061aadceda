use anyhow::{Context, Result};
use chrono::{Local, Timelike};

use pacer::config::{format_duration, Config};
use pacer::scheduler::{compute, DelaySequence, ScheduleSpec};

/// Preview the delay sequence a schedule would produce if started now
pub fn plan(config: &Config, limit: usize, json: bool) -> Result<()> {
    let spec = config.schedule.to_spec().context("Invalid schedule")?;
    let start = Local::now();
    let delays = compute(&spec, &start)?;

    if json {
        let offsets: Vec<u128> = delays.offsets().iter().map(|d| d.as_millis()).collect();
        let output = serde_json::json!({
            "spec": spec,
            "start": start.to_rfc3339(),
            "delays_ms": delays.iter().map(|d| d.as_millis()).collect::<Vec<_>>(),
            "offsets_ms": offsets,
            "hourly": delays.hourly_histogram(&start),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print!("{}", render_plan(&spec, &delays, &start, limit));
    Ok(())
}

/// Human-readable plan: summary, first waits, and an hourly histogram
pub fn render_plan(
    spec: &ScheduleSpec,
    delays: &DelaySequence,
    start: &chrono::DateTime<Local>,
    limit: usize,
) -> String {
    let mut output = String::from("Distribution Plan\n");
    output.push_str(&format!("{:=<40}\n", ""));
    output.push_str(&format!("Requests: {}\n", spec.total_requests));
    output.push_str(&format!("Window: {}\n", format_duration(spec.duration_window)));
    output.push_str(&format!("Pattern: {}\n", spec.pattern.display_name()));

    if let Some(peak) = spec.peak {
        output.push_str(&format!(
            "Peak: {:02}:00-{:02}:00 (x{:.1})\n",
            peak.start_hour, peak.end_hour, peak.weight
        ));
    }
    if let Some(jitter) = spec.jitter {
        output.push_str(&format!(
            "Jitter: ±{:.0}% (seed {})\n",
            jitter.ratio * 100.0,
            jitter.seed
        ));
    }
    if let Some((min, max)) = delays.bounds() {
        output.push_str(&format!(
            "Wait range: {:.1}s - {:.1}s\n",
            min.as_secs_f64(),
            max.as_secs_f64()
        ));
    }

    output.push_str(&format!("\nFirst {} dispatches:\n", limit.min(spec.total_requests)));
    for (index, offset) in delays.offsets().iter().enumerate().take(limit) {
        let at = *start + chrono::Duration::milliseconds(offset.as_millis() as i64);
        output.push_str(&format!(
            "  #{:<6} {}  (+{:.1}s)\n",
            index + 1,
            at.format("%Y-%m-%d %H:%M:%S"),
            offset.as_secs_f64()
        ));
    }

    let histogram = delays.hourly_histogram(start);
    let peak_count = histogram.iter().copied().max().unwrap_or(0).max(1);
    output.push_str("\nDispatches per hour:\n");
    for (hour, count) in histogram.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        let bar = "#".repeat((count * 30).div_ceil(peak_count));
        let marker = if hour as u32 == start.hour() { "*" } else { " " };
        output.push_str(&format!("  {hour:02}h{marker} {count:>6} {bar}\n"));
    }

    output
}
