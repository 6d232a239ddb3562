use anyhow::{anyhow, bail, Context, Result};

use crate::{board::TvSort, models::shelf_id};

pub const HELP: &str = "\
commands:
  grid                              show the editable grid
  tv                                show the active/idle summary
  sort rack|duration                order of active shelves in the summary
  start <rack> <shelf>              start a shelf timer
  reset <rack> <shelf>              stop and clear a shelf
  edit <rack> <shelf> <HH> <MM>     set the elapsed time of a shelf
  station <rack> <shelf> <token|->  assign a station (- clears it)
  reset-all                         reset every shelf on the board
  help                              show this list
  quit                              leave the console";

/// A shelf addressed by rack number and 1-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShelfRef {
    pub rack: u32,
    pub position: u32,
}

impl ShelfRef {
    pub fn id(&self) -> String {
        shelf_id(self.rack, self.position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Grid,
    Tv,
    Sort(TvSort),
    Start(ShelfRef),
    Reset(ShelfRef),
    Edit {
        shelf: ShelfRef,
        hours: String,
        minutes: String,
    },
    Station {
        shelf: ShelfRef,
        station: String,
    },
    ResetAll,
    Help,
    Quit,
}

fn number(raw: Option<&str>, what: &str) -> Result<u32> {
    let raw = raw.ok_or_else(|| anyhow!("missing {what}"))?;
    raw.parse()
        .with_context(|| format!("{what} must be a number, got '{raw}'"))
}

fn shelf_ref<'a>(args: &mut impl Iterator<Item = &'a str>) -> Result<ShelfRef> {
    let rack = number(args.next(), "rack number")?;
    let position = number(args.next(), "shelf number")?;
    if position == 0 {
        bail!("shelf numbers start at 1");
    }
    Ok(ShelfRef { rack, position })
}

impl Command {
    /// Parses one console line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "grid" => Command::Grid,
            "tv" => Command::Tv,
            "sort" => {
                let raw = words.next().unwrap_or_default();
                let sort = TvSort::parse(raw)
                    .ok_or_else(|| anyhow!("sort must be 'rack' or 'duration', got '{raw}'"))?;
                Command::Sort(sort)
            }
            "start" => Command::Start(shelf_ref(&mut words)?),
            "reset" => Command::Reset(shelf_ref(&mut words)?),
            "edit" => {
                let shelf = shelf_ref(&mut words)?;
                let hours = words.next().unwrap_or_default().to_string();
                let minutes = words.next().unwrap_or_default().to_string();
                Command::Edit {
                    shelf,
                    hours,
                    minutes,
                }
            }
            "station" => {
                let shelf = shelf_ref(&mut words)?;
                let station = match words.next() {
                    None => bail!("missing station token (use '-' to clear)"),
                    Some("-") => String::new(),
                    Some(token) => token.to_string(),
                };
                Command::Station { shelf, station }
            }
            "reset-all" => Command::ResetAll,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command '{other}' (try 'help')"),
        };

        if let Some(extra) = words.next() {
            bail!("unexpected argument '{extra}'");
        }
        Ok(Some(command))
    }
}
