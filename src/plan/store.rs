//! On-disk persistence of a [`Plan`] as a human-readable record list.
//!
//! Each record is bracketed by `begin`/`end`, with `key value` lines in
//! between. Lines whose first non-blank character is `#` are comments;
//! blank lines are ignored. Unknown keys are silently ignored so older
//! binaries can read plans written by newer ones.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use super::{KnobId, Location, Plan, PlanEntry};
use crate::error::PlanIoError;

fn plan_path(project: &str, name: &str) -> Result<PathBuf, PlanIoError> {
    let home = std::env::var("HOME").map_err(|_| {
        PlanIoError::Malformed("HOME environment variable is not set".to_string())
    })?;
    Ok(PathBuf::from(home).join(format!(".{project}")).join(format!("{name}.plan")))
}

/// Does a plan file exist at `<home>/.<project>/<name>.plan`?
pub fn plan_exists(project: &str, name: &str) -> bool {
    match plan_path(project, name) {
        Ok(path) => path.is_file(),
        Err(_) => false,
    }
}

/// Write `plan` to `<home>/.<project>/<name>.plan`, creating the project
/// directory tree if it doesn't exist. Entries are emitted in ascending
/// `id` order.
pub fn write_plan(plan: &Plan, project: &str, name: &str) -> Result<(), PlanIoError> {
    let path = plan_path(project, name)?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut out = String::new();
    out.push_str("# accel-mem-tuner plan file\n\n");
    for entry in plan.iter() {
        out.push_str("begin\n");
        out.push_str(&format!("  id {}\n", entry.id));
        out.push_str(&format!("  size {}\n", entry.size));
        match entry.loc {
            Location::PinnedHost => out.push_str("  loc pinned\n"),
            Location::Device => out.push_str("  loc global\n"),
        }
        if entry.inloop {
            out.push_str("  inloop true\n");
        }
        out.push_str("end\n\n");
    }

    let mut file = fs::File::create(&path)?;
    file.write_all(out.as_bytes())?;
    Ok(())
}

/// Read the plan at `<home>/.<project>/<name>.plan`.
pub fn read_plan(project: &str, name: &str) -> Result<Plan, PlanIoError> {
    let path = plan_path(project, name)?;
    let text = fs::read_to_string(&path)
        .map_err(|_| PlanIoError::NotFound(path.display().to_string()))?;

    let mut plan = Plan::new();
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        if is_begin(line) {
            let entry = parse_record(&mut lines)?;
            plan.push(entry);
        }
    }
    Ok(plan)
}

fn is_begin(line: &str) -> bool {
    collapse_whitespace(line) == "begin"
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_record<'a>(lines: &mut std::iter::Peekable<impl Iterator<Item = &'a str>>) -> Result<PlanEntry, PlanIoError> {
    let mut id: Option<KnobId> = None;
    let mut size: Option<u64> = None;
    let mut loc = Location::Device;
    let mut inloop = false;

    for line in lines.by_ref() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            continue;
        }
        let collapsed = collapse_whitespace(line);
        if collapsed.is_empty() {
            continue;
        }
        if collapsed == "end" {
            let id = id.ok_or_else(|| PlanIoError::Malformed("record missing id".to_string()))?;
            let size = size.ok_or_else(|| PlanIoError::Malformed("record missing size".to_string()))?;
            return Ok(PlanEntry {
                id,
                size,
                loc,
                inloop,
                first_hit: true,
                gold_member: false,
                host_ptr: None,
                device_ptr: None,
            });
        }

        let mut parts = collapsed.splitn(2, ' ');
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        match key {
            "id" => {
                id = value.parse().ok();
            }
            "size" => {
                size = value.parse().ok();
            }
            "loc" => match value {
                "global" => loc = Location::Device,
                "pinned" => loc = Location::PinnedHost,
                other => {
                    return Err(PlanIoError::Malformed(format!("bad memory location: {other}")));
                }
            },
            "inloop" => match value {
                "true" => inloop = true,
                "false" => inloop = false,
                other => {
                    return Err(PlanIoError::Malformed(format!("bad inloop specification: {other}")));
                }
            },
            // Unknown keys are ignored for forward compatibility.
            _ => {}
        }
    }

    Err(PlanIoError::Malformed("record missing end".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanEntry;
    use crate::test_support::with_sandboxed_home;

    #[test]
    fn round_trips_modulo_transient_fields() {
        with_sandboxed_home(|_| {
            let mut plan = Plan::new();
            plan.push(PlanEntry::new(0, 1024));
            let mut e1 = PlanEntry::new(1, 2048);
            e1.loc = Location::PinnedHost;
            e1.inloop = true;
            plan.push(e1);

            write_plan(&plan, "testproj", "testplan").unwrap();
            let read_back = read_plan("testproj", "testplan").unwrap();

            assert_eq!(read_back.len(), plan.len());
            for (a, b) in plan.iter().zip(read_back.iter()) {
                assert_eq!(a.id, b.id);
                assert_eq!(a.size, b.size);
                assert_eq!(a.loc, b.loc);
                assert_eq!(a.inloop, b.inloop);
            }
        });
    }

    #[test]
    fn missing_file_is_not_found() {
        with_sandboxed_home(|_| {
            assert!(matches!(read_plan("nope", "nope"), Err(PlanIoError::NotFound(_))));
        });
    }

    #[test]
    fn exists_predicate_matches_write() {
        with_sandboxed_home(|_| {
            assert!(!plan_exists("proj", "plan"));
            let plan = Plan::new();
            write_plan(&plan, "proj", "plan").unwrap();
            assert!(plan_exists("proj", "plan"));
        });
    }

    #[test]
    fn unknown_keys_are_ignored() {
        with_sandboxed_home(|_| {
            let path = plan_path("proj", "plan").unwrap();
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(
                &path,
                "# comment\nbegin\n  id 0\n  size 10\n  loc global\n  future_key surprise\nend\n",
            )
            .unwrap();
            let plan = read_plan("proj", "plan").unwrap();
            assert_eq!(plan.len(), 1);
            assert_eq!(plan.get(0).unwrap().size, 10);
        });
    }
}
