//! Reads a recorded ride from a GPX file, so it can be replayed through
//! the tracking engine. Only `<trkpt>` elements matter; everything else
//! in the file (metadata, waypoints, routes) is skipped.
//!
//! ```text
//! <trkpt lat="" lon="">
//!     <ele>                                  -> altitude
//!     <time>                                 -> timestamp (mandatory)
//!     <extensions>
//!         <gpxtpx:TrackPointExtension>
//!             <gpxtpx:hr>                    -> heart-rate sample
//!             <gpxtpx:speed>                 -> device speed, m/s
//! ```

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context, Result};
use log::info;
use logging_timer::time;
use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use time::{format_description::well_known, OffsetDateTime};

use crate::model::{HeartRateSample, LocationSample};

/// The samples of a recorded ride, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recording {
    pub filename: Option<PathBuf>,
    pub locations: Vec<LocationSample>,
    pub heart_rate: Vec<HeartRateSample>,
}

impl Recording {
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// GPX has nowhere to store the horizontal accuracy of a fix, so the
/// caller has to say what to assume.
#[time]
pub fn read_recording_from_file<P: AsRef<Path>>(input_file: P, accuracy_metres: f64) -> Result<Recording> {
    let input_file = input_file.as_ref();
    info!("Reading GPX file {:?}", input_file);
    let contents = std::fs::read(input_file)
        .with_context(|| format!("Could not read {:?}", input_file))?;
    let mut recording = read_recording_from_slice(&contents, accuracy_metres)
        .with_context(|| format!("Could not parse {:?}", input_file))?;
    recording.filename = Some(input_file.to_owned());
    info!(
        "Read {} trackpoints and {} heart-rate readings from {:?}",
        recording.locations.len(),
        recording.heart_rate.len(),
        input_file
    );
    Ok(recording)
}

pub fn read_recording_from_slice(data: &[u8], accuracy_metres: f64) -> Result<Recording> {
    let mut xml_reader = Reader::from_reader(data);
    let mut recording = Recording::default();

    loop {
        match xml_reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"trkpt" => {
                let point = parse_trackpoint(&e, &mut xml_reader)?;
                recording.locations.push(point.to_location_sample(accuracy_metres));
                if let Some(bpm) = point.heart_rate {
                    recording.heart_rate.push(HeartRateSample {
                        bpm,
                        time: point.time,
                    });
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"trkpt" => {
                let (lat, lon) = parse_lat_lon(&e, &xml_reader)?;
                bail!("Trackpoint at {lat},{lon} has no time");
            }
            Ok(Event::Eof) => return Ok(recording),
            Err(e) => bail!("Error at position {}: {:?}", xml_reader.error_position(), e),
            _ => (),
        }
    }
}

/// What we take from a single `<trkpt>`.
#[derive(Debug, Clone, PartialEq)]
struct RecordedPoint {
    lat: f64,
    lon: f64,
    ele: Option<f64>,
    time: OffsetDateTime,
    heart_rate: Option<u16>,
    speed_mps: Option<f64>,
}

impl RecordedPoint {
    fn to_location_sample(&self, accuracy_metres: f64) -> LocationSample {
        LocationSample {
            lat: self.lat,
            lon: self.lon,
            altitude: self.ele,
            accuracy_metres,
            speed_mps: self.speed_mps.unwrap_or_default(),
            time: self.time,
        }
    }
}

fn parse_trackpoint(start: &BytesStart<'_>, xml_reader: &mut Reader<&[u8]>) -> Result<RecordedPoint> {
    let (lat, lon) = parse_lat_lon(start, xml_reader)?;
    let mut ele = None;
    let mut time = None;
    let mut heart_rate = None;
    let mut speed_mps = None;

    loop {
        match xml_reader.read_event() {
            // Extension elements are namespaced (gpxtpx:hr, ns3:hr...), so
            // match on the local name.
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"ele" => ele = Some(xml_reader.read_inner_as()?),
                b"time" => time = Some(xml_reader.read_inner_as_time()?),
                b"hr" => heart_rate = Some(xml_reader.read_inner_as()?),
                b"speed" => speed_mps = Some(xml_reader.read_inner_as()?),
                _ => { /* containers and elements we don't use */ }
            },
            Ok(Event::End(e)) if e.name().as_ref() == b"trkpt" => {
                return Ok(RecordedPoint {
                    lat,
                    lon,
                    ele,
                    time: time.with_context(|| format!("Trackpoint at {lat},{lon} has no time"))?,
                    heart_rate,
                    speed_mps,
                });
            }
            Ok(Event::Eof) => bail!("Unexpected end of file inside a trackpoint"),
            Err(e) => bail!("Error at position {}: {:?}", xml_reader.error_position(), e),
            _ => (),
        }
    }
}

fn parse_lat_lon<R>(tag: &BytesStart<'_>, xml_reader: &Reader<R>) -> Result<(f64, f64)> {
    let mut lat = None;
    let mut lon = None;

    for attr in tag.attributes() {
        let attr = attr?;
        let value = xml_reader.cow_to_string(attr.value)?;
        match attr.key.as_ref() {
            b"lat" => lat = Some(parse_value::<f64>(&value)?),
            b"lon" => lon = Some(parse_value::<f64>(&value)?),
            _ => (),
        }
    }

    Ok((
        lat.context("lat attribute not found")?,
        lon.context("lon attribute not found")?,
    ))
}

fn parse_value<T: FromStr>(value: &str) -> Result<T> {
    match value.trim().parse::<T>() {
        Ok(v) => Ok(v),
        Err(_) => bail!("Could not parse {} into {}", value, std::any::type_name::<T>()),
    }
}

trait XmlReaderConversions {
    fn bytes_to_string(&self, bytes: &[u8]) -> Result<String>;
    fn cow_to_string(&self, bytes: Cow<'_, [u8]>) -> Result<String>;
}

impl<R> XmlReaderConversions for Reader<R> {
    #[inline]
    fn bytes_to_string(&self, bytes: &[u8]) -> Result<String> {
        Ok(self.decoder().decode(bytes)?.into())
    }

    #[inline]
    fn cow_to_string(&self, bytes: Cow<'_, [u8]>) -> Result<String> {
        self.bytes_to_string(&bytes)
    }
}

trait XmlReaderExtensions {
    fn read_inner_as_string(&mut self) -> Result<String>;
    fn read_inner_as_time(&mut self) -> Result<OffsetDateTime>;
    fn read_inner_as<T: FromStr>(&mut self) -> Result<T>;
}

impl XmlReaderExtensions for Reader<&[u8]> {
    fn read_inner_as_string(&mut self) -> Result<String> {
        match self.read_event() {
            Ok(Event::Text(text)) => self.bytes_to_string(&text),
            e => bail!("Got unexpected XML element {:?} (was expecting Event::Text)", e),
        }
    }

    fn read_inner_as_time(&mut self) -> Result<OffsetDateTime> {
        let t = self.read_inner_as_string()?;
        Ok(OffsetDateTime::parse(t.trim(), &well_known::Rfc3339)?)
    }

    fn read_inner_as<T: FromStr>(&mut self) -> Result<T> {
        let t = self.read_inner_as_string()?;
        parse_value(&t)
    }
}
