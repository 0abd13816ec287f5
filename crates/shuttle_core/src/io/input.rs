use std::{collections::HashSet, fs, io::Read, path::Path};

use crate::{
    Error, Result,
    geo::Coordinate,
    model::{Stop, StopKind},
};

/// Reads stop tokens from `path`, or stdin when `None`.
pub fn read_stops(path: Option<&Path>) -> Result<Vec<Stop>> {
    let input = match path {
        Some(path) => fs::read_to_string(path).map_err(|e| {
            Error::invalid_input(format!("failed to read stops from {}: {e}", path.display()))
        })?,
        None => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            input
        }
    };
    parse_stops(&input)
}

/// Parses whitespace-separated `id,lat,lng,kind[,line]` tokens. A missing or
/// `-` line leaves the stop unassigned.
pub fn parse_stops(input: &str) -> Result<Vec<Stop>> {
    let mut stops = Vec::new();
    let mut seen = HashSet::new();

    for (idx, tok) in input.split_whitespace().enumerate() {
        let token = idx + 1;
        let fields: Vec<&str> = tok.split(',').collect();
        if !(4..=5).contains(&fields.len()) {
            return Err(Error::invalid_input(format!(
                "Token {token}: expected 'id,lat,lng,kind[,line]' but got: {tok}"
            )));
        }

        let id: u64 = fields[0].parse().map_err(|_| {
            Error::invalid_input(format!("Token {token}: invalid stop id: {}", fields[0]))
        })?;
        let lat: f64 = fields[1].parse().map_err(|_| {
            Error::invalid_input(format!("Token {token}: invalid latitude: {}", fields[1]))
        })?;
        let lng: f64 = fields[2].parse().map_err(|_| {
            Error::invalid_input(format!("Token {token}: invalid longitude: {}", fields[2]))
        })?;
        let position = Coordinate::new(lat, lng);
        if !position.is_valid() {
            return Err(Error::invalid_input(format!(
                "Token {token}: coordinate out of range: {position}"
            )));
        }
        let kind = StopKind::parse(fields[3]).map_err(|e| match e {
            Error::InvalidInput(msg) => Error::invalid_input(format!("Token {token}: {msg}")),
            other => other,
        })?;

        if !seen.insert(id) {
            return Err(Error::invalid_input(format!(
                "Token {token}: duplicate stop id {id}"
            )));
        }

        let mut stop = Stop::new(id, position, kind);
        match fields.get(4).copied() {
            None | Some("-") => {}
            Some(raw) => {
                let line = raw.parse().map_err(|_| {
                    Error::invalid_input(format!("Token {token}: invalid line id: {raw}"))
                })?;
                stop = stop.on_line(line);
            }
        }
        stops.push(stop);
    }

    if stops.is_empty() {
        return Err(Error::invalid_input("No stops provided."));
    }

    Ok(stops)
}
