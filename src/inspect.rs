//! Detailed container inspection: pretty JSON stanzas or a caller-supplied
//! `{{.Field}}` template rendered per record.

use clap::Args;
use serde_json::Value;

use crate::container::state::ContainerRecord;
use crate::container::{self, identity, state};
use crate::error::{Error, Result};
use crate::home::AppHome;
use crate::utils;

#[derive(Args, Debug)]
pub struct Inspect {
    /// Names or IDs to inspect.
    #[arg(required = true)]
    pub containers: Vec<String>,
    /// Also compute the container's disk usage.
    #[arg(short, long)]
    pub size: bool,
    /// Render each record through a template instead of JSON.
    #[arg(short, long)]
    pub format: Option<String>,
}

impl Inspect {
    pub fn exec(&self, home: &AppHome) -> Result<()> {
        let out = inspect(home, &self.containers, self.size, self.format.as_deref())?;
        print!("{}", out);
        Ok(())
    }
}

pub fn inspect(
    home: &AppHome,
    containers: &[String],
    size: bool,
    format: Option<&str>,
) -> Result<String> {
    let mut result = String::new();

    for container in containers {
        let id = identity::resolve(home, container);
        let config_path = home.containers_dir().join(&id).join(state::CONFIG_FILE);

        let mut record = match ContainerRecord::load(&config_path) {
            Ok(record) => record,
            Err(Error::CorruptState(e)) => {
                // Irrecoverable; remove it through the public CLI and let
                // the caller see what happened.
                container::remove_out_of_band(home, &id);
                return Err(Error::CorruptState(e));
            }
            Err(e) => return Err(e),
        };

        record.status = Some(container::status_of(home, &record).to_string());
        if size {
            record.size = Some(utils::disk_usage_mib(&home.containers_dir().join(&id))?);
        }

        match format {
            Some(template) => {
                result.push_str(&render_template(template, &record)?);
            }
            None => {
                result.push_str(&serde_json::to_string_pretty(&record).map_err(|e| {
                    Error::Internal(format!("record does not serialize: {}", e))
                })?);
                result.push('\n');
            }
        }
    }

    Ok(result)
}

/// Substitutes `{{.Field}}` placeholders with record fields, matching the
/// field names case-insensitively. Unknown fields are an input error.
fn render_template(template: &str, record: &ContainerRecord) -> Result<String> {
    let value = serde_json::to_value(record)
        .map_err(|e| Error::Internal(format!("record does not serialize: {}", e)))?;
    let Value::Object(fields) = value else {
        return Err(Error::Internal("record is not a JSON object".into()));
    };

    let mut out = String::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(Error::InvalidInput(format!(
                "unterminated placeholder in template {:?}",
                template
            )));
        };
        let name = after[..end].trim().trim_start_matches('.');
        let key = name.to_lowercase();
        let field = fields.get(&key).ok_or_else(|| {
            Error::InvalidInput(format!("unknown field {} in template", name))
        })?;
        match field {
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
