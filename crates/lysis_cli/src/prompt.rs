use anyhow::{bail, Context, Result};
use log::warn;
use lysis_core::search::parse_iteration_count;
use std::io::{BufRead, Write};

pub const ITERATIONS_PROMPT: &str = "Enter integral number of game iterations:";

/// Asks for the number of game iterations, re-asking on malformed input.
pub fn read_iterations<R, W>(input: &mut R, output: &mut W, attempts: usize) -> Result<i64>
where
    R: BufRead,
    W: Write,
{
    let mut last_error = None;
    for _ in 0..attempts {
        write!(output, "{ITERATIONS_PROMPT}")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            bail!("standard input closed before an iteration count was entered");
        }
        match parse_iteration_count(&line) {
            Ok(iterations) => return Ok(iterations),
            Err(err) => {
                warn!("{err}");
                writeln!(output)?;
                last_error = Some(err);
            }
        }
    }
    match last_error {
        Some(err) => Err(err).with_context(|| format!("gave up after {attempts} attempts")),
        None => bail!("no attempts allowed to read the iteration count"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ask(input: &str) -> (Result<i64>, String) {
        let mut output = Vec::new();
        let result = read_iterations(&mut Cursor::new(input), &mut output, 3);
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn reads_first_valid_answer() {
        let (result, output) = ask("25\n");
        assert_eq!(result.unwrap(), 25);
        assert_eq!(output, ITERATIONS_PROMPT);
    }

    #[test]
    fn re_asks_after_garbage() {
        let (result, output) = ask("ten\n 7 \n");
        assert_eq!(result.unwrap(), 7);
        assert_eq!(output.matches(ITERATIONS_PROMPT).count(), 2);
    }

    #[test]
    fn gives_up_after_three_attempts() {
        let (result, output) = ask("a\nb\nc\n4\n");
        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("invalid iteration count \"c\""));
        assert!(err.to_string().contains("3 attempts"));
        assert_eq!(output.matches(ITERATIONS_PROMPT).count(), 3);
    }

    #[test]
    fn closed_input_is_an_error() {
        let (result, _) = ask("");
        assert!(result.unwrap_err().to_string().contains("closed"));
    }
}
