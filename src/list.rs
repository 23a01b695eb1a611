//! Container listing with the recognized filter map.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};

use clap::Args;
use tabwriter::TabWriter;

use crate::container::{self, ContainerRecord};
use crate::error::{Error, Result};
use crate::home::AppHome;

/// Separator between alternatives in a label filter value.
const FILTER_SEPARATOR: &str = ",";

#[derive(Args, Debug)]
pub struct List {
    /// Filter output, `key=value`; recognized keys are label, status,
    /// name and id.
    #[arg(short, long = "filter")]
    pub filters: Vec<String>,
    /// Also compute disk usage per container.
    #[arg(short, long)]
    pub size: bool,
}

impl List {
    pub fn exec(&self, home: &AppHome) -> Result<()> {
        let filters = parse_filters(&self.filters)?;
        let records = list(home, self.size, &filters)?;

        let mut tw = TabWriter::new(io::stdout());
        if self.size {
            writeln!(&mut tw, "CONTAINER ID\tNAME\tIMAGE\tSTATUS\tCREATED\tSIZE")?;
        } else {
            writeln!(&mut tw, "CONTAINER ID\tNAME\tIMAGE\tSTATUS\tCREATED")?;
        }
        for record in &records {
            let short_id = record.id.get(..12).unwrap_or(&record.id);
            if self.size {
                writeln!(
                    &mut tw,
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    short_id,
                    record.names,
                    record.image,
                    record.status.as_deref().unwrap_or(""),
                    record.created,
                    record.size.as_deref().unwrap_or("")
                )?;
            } else {
                writeln!(
                    &mut tw,
                    "{}\t{}\t{}\t{}\t{}",
                    short_id,
                    record.names,
                    record.image,
                    record.status.as_deref().unwrap_or(""),
                    record.created
                )?;
            }
        }
        tw.flush()?;
        Ok(())
    }
}

/// All containers matching the filter map, in directory order.
pub fn list(
    home: &AppHome,
    size: bool,
    filters: &HashMap<String, String>,
) -> Result<Vec<ContainerRecord>> {
    let containers_dir = home.containers_dir();
    if !containers_dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(&containers_dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(record) = container::info(home, &name, size)? else {
            continue;
        };
        if matches_filters(&record, filters) {
            records.push(record);
        }
    }

    Ok(records)
}

fn parse_filters(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut filters = HashMap::new();
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            return Err(Error::InvalidInput(format!(
                "filter {} is not of the form key=value",
                item
            )));
        };
        filters.insert(key.to_string(), value.to_string());
    }
    Ok(filters)
}

/// A record matches iff every supplied filter finds at least one match in
/// it. Labels compare per entry against the separator-split filter value;
/// the other keys compare exactly. Unknown keys warn and match nothing.
pub fn matches_filters(record: &ContainerRecord, filters: &HashMap<String, String>) -> bool {
    filters.iter().all(|(key, value)| match key.as_str() {
        "label" => value
            .split(FILTER_SEPARATOR)
            .any(|wanted| record.labels.iter().any(|label| label == wanted)),
        "status" => record.status.as_deref() == Some(value),
        "name" => record.names == *value,
        "id" => record.id == *value,
        other => {
            log::warn!(
                "invalid filter {}, valid filters are: label, status, name, id",
                other
            );
            false
        }
    })
}
