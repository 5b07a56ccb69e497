//! Interactive questions on the terminal

use crate::error::{RunnerError, RunnerResult};
use std::io::{BufRead, Write};

/// Asks the user for answers
///
/// Implementations must re-ask on invalid answers and return
/// [`RunnerError::InputClosed`] when no more input is available.
pub trait Prompter: Send {
    /// Free text; an empty answer selects `default` when one is given
    fn input(&mut self, question: &str, default: Option<&str>) -> RunnerResult<String>;

    /// Pick one of `options`, returning its index
    fn select(&mut self, title: &str, options: &[String], default: usize) -> RunnerResult<usize>;

    /// Yes or no
    fn confirm(&mut self, question: &str, default: bool) -> RunnerResult<bool>;

    /// A non-negative integer
    fn number(&mut self, question: &str, default: u32) -> RunnerResult<u32>;
}

/// Prompter reading answers line by line from `reader`
pub struct TerminalPrompter<R, W> {
    reader: R,
    writer: W,
    assume_defaults: bool,
}

impl TerminalPrompter<std::io::BufReader<std::io::Stdin>, std::io::Stdout> {
    /// Prompter on the process's stdin and stdout
    pub fn stdio(assume_defaults: bool) -> Self {
        Self::new(
            std::io::BufReader::new(std::io::stdin()),
            std::io::stdout(),
            assume_defaults,
        )
    }
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(reader: R, writer: W, assume_defaults: bool) -> Self {
        Self {
            reader,
            writer,
            assume_defaults,
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn read_answer(&mut self, prompt: &str) -> RunnerResult<String> {
        write!(self.writer, "{}", prompt)?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(RunnerError::InputClosed);
        }
        Ok(line.trim().to_string())
    }

    fn say(&mut self, message: &str) -> RunnerResult<()> {
        writeln!(self.writer, "{}", message)?;
        Ok(())
    }

    /// Print the question with its default when defaults are assumed
    fn echo_default(&mut self, question: &str, answer: &str) -> RunnerResult<()> {
        self.say(&format!("{}: {}", question, answer))
    }
}

impl<R: BufRead + Send, W: Write + Send> Prompter for TerminalPrompter<R, W> {
    fn input(&mut self, question: &str, default: Option<&str>) -> RunnerResult<String> {
        if self.assume_defaults {
            let answer = default.unwrap_or_default().to_string();
            self.echo_default(question, &answer)?;
            return Ok(answer);
        }

        let prompt = match default {
            Some(d) if !d.is_empty() => format!("{} [{}]: ", question, d),
            _ => format!("{}: ", question),
        };

        loop {
            let answer = self.read_answer(&prompt)?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            if let Some(d) = default {
                return Ok(d.to_string());
            }
            self.say("An answer is required.")?;
        }
    }

    fn select(&mut self, title: &str, options: &[String], default: usize) -> RunnerResult<usize> {
        if options.is_empty() {
            return Err(RunnerError::InvalidInput(format!("nothing to choose for: {}", title)));
        }
        let default = default.min(options.len() - 1);

        if self.assume_defaults {
            self.echo_default(title, &options[default])?;
            return Ok(default);
        }

        self.say(&format!("\n{}", title))?;
        for (i, option) in options.iter().enumerate() {
            self.say(&format!("  {:>2}) {}", i + 1, option))?;
        }

        let prompt = format!("Enter a number [{}]: ", default + 1);
        loop {
            let answer = self.read_answer(&prompt)?;
            if answer.is_empty() {
                return Ok(default);
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
                _ => self.say(&format!(
                    "Please enter a number between 1 and {}.",
                    options.len()
                ))?,
            }
        }
    }

    fn confirm(&mut self, question: &str, default: bool) -> RunnerResult<bool> {
        if self.assume_defaults {
            self.echo_default(question, if default { "yes" } else { "no" })?;
            return Ok(default);
        }

        let prompt = format!("{} [{}]: ", question, if default { "Y/n" } else { "y/N" });
        loop {
            let answer = self.read_answer(&prompt)?.to_lowercase();
            match answer.as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("Please answer y or n.")?,
            }
        }
    }

    fn number(&mut self, question: &str, default: u32) -> RunnerResult<u32> {
        if self.assume_defaults {
            self.echo_default(question, &default.to_string())?;
            return Ok(default);
        }

        let prompt = format!("{} [{}]: ", question, default);
        loop {
            let answer = self.read_answer(&prompt)?;
            if answer.is_empty() {
                return Ok(default);
            }
            match answer.parse::<u32>() {
                Ok(n) => return Ok(n),
                Err(_) => self.say("Please enter a whole number.")?,
            }
        }
    }
}
