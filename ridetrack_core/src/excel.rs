//! Writes a finished ride to an xlsx workbook with two sheets: a Summary
//! of the headline figures and the list of Events.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use logging_timer::time;
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet};
use time::{format_description::well_known, Duration, OffsetDateTime};

use crate::model::{FinishedRide, RideEvent, RideSummary};

#[time]
pub fn create_ride_xlsx(ride: &FinishedRide) -> Result<Workbook> {
    let mut workbook = Workbook::new();

    let summary_ws = workbook.add_worksheet();
    summary_ws.set_name("Summary")?;
    write_summary(summary_ws, &ride.summary)?;

    let events_ws = workbook.add_worksheet();
    events_ws.set_name("Events")?;
    write_events(events_ws, &ride.events)?;

    Ok(workbook)
}

pub fn write_ride_xlsx_to_file<P: AsRef<Path>>(output_file: P, mut workbook: Workbook) -> Result<()> {
    let output_file = output_file.as_ref();
    info!("Writing file {:?}", output_file);
    workbook
        .save(output_file)
        .with_context(|| format!("Could not write {:?}", output_file))?;
    let metadata = std::fs::metadata(output_file)?;
    info!("Wrote {:?}, {} Kb", output_file, metadata.len() / 1024);
    Ok(())
}

fn write_summary(ws: &mut Worksheet, summary: &RideSummary) -> Result<()> {
    let label = Format::new().set_bold();
    let decimal = Format::new().set_num_format("0.00").set_align(FormatAlign::Right);
    let whole = Format::new().set_num_format("0").set_align(FormatAlign::Right);
    let text = Format::new().set_align(FormatAlign::Right);

    enum Value {
        Text(String),
        Decimal(f64),
        Whole(f64),
    }

    let ride_id = summary
        .ride_id
        .map_or_else(String::new, |id| id.to_string());
    let rows = [
        ("Ride", Value::Text(ride_id)),
        ("Start Time", Value::Text(format_utc_date(summary.start_time)?)),
        ("End Time", Value::Text(format_utc_date(summary.end_time)?)),
        ("Elapsed Time", Value::Text(format_duration(summary.elapsed))),
        ("Paused Time", Value::Text(format_duration(summary.paused_time))),
        ("Moving Time", Value::Text(format_duration(summary.moving_time))),
        ("Distance (km)", Value::Decimal(summary.distance_km)),
        ("Average Speed (km/h)", Value::Decimal(summary.average_speed_kmh)),
        ("Max Speed (km/h)", Value::Decimal(summary.max_speed_kmh)),
        ("Average Heart Rate", Value::Whole(summary.average_heart_rate.into())),
        ("Max Heart Rate", Value::Whole(summary.max_heart_rate.into())),
        ("Ascent (m)", Value::Whole(summary.elevation_gain_metres)),
        ("Descent (m)", Value::Whole(summary.elevation_loss_metres)),
    ];

    for (row, (name, value)) in rows.into_iter().enumerate() {
        let row = row as u32;
        ws.write_string_with_format(row, 0, name, &label)?;
        match value {
            Value::Text(s) => ws.write_string_with_format(row, 1, s, &text)?,
            Value::Decimal(n) => ws.write_number_with_format(row, 1, n, &decimal)?,
            Value::Whole(n) => ws.write_number_with_format(row, 1, n, &whole)?,
        };
    }

    ws.autofit();
    Ok(())
}

fn write_events(ws: &mut Worksheet, events: &[RideEvent]) -> Result<()> {
    let header = Format::new().set_bold();
    let speed = Format::new().set_num_format("0.0");
    let coord = Format::new().set_num_format("0.000000");

    let headings = ["Time", "Event", "Lat", "Lon", "Altitude (m)", "Speed (km/h)", "Note"];
    for (col, heading) in headings.into_iter().enumerate() {
        ws.write_string_with_format(0, col as u16, heading, &header)?;
    }
    ws.set_freeze_panes(1, 0)?;

    for (idx, event) in events.iter().enumerate() {
        let row = idx as u32 + 1;
        ws.write_string(row, 0, format_utc_date(event.time)?)?;
        ws.write_string(row, 1, event.event_type.to_string())?;
        ws.write_number_with_format(row, 2, event.lat, &coord)?;
        ws.write_number_with_format(row, 3, event.lon, &coord)?;
        if let Some(altitude) = event.altitude {
            ws.write_number(row, 4, altitude)?;
        }
        if let Some(kmh) = event.speed_kmh {
            ws.write_number_with_format(row, 5, kmh, &speed)?;
        }
        if let Some(note) = &event.note {
            ws.write_string(row, 6, note)?;
        }
    }

    ws.autofit();
    Ok(())
}

/// Formats a date into a string like "2024-09-01T05:10:44Z".
fn format_utc_date(date: OffsetDateTime) -> Result<String> {
    Ok(date.format(&well_known::Rfc3339)?)
}

/// Formats a duration as "h:mm:ss".
fn format_duration(duration: Duration) -> String {
    let seconds = duration.whole_seconds().max(0);
    format!("{}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}
