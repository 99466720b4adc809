use std::{
    fmt::Display,
    io::{self, BufRead, Stdout, Write},
};

/// Line oriented question and answer terminal.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<io::StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Console::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, message: impl Display) -> io::Result<()> {
        writeln!(self.output, "{}", message)?;
        self.output.flush()
    }

    /// Prints `question` and returns the next line without its line ending.
    pub fn ask(&mut self, question: &str) -> io::Result<String> {
        self.say(question)?;
        let mut answer = String::new();
        if self.input.read_line(&mut answer)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("no answer to {:?}", question),
            ));
        }
        Ok(answer.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Waits for the user to press Enter. End of input counts as a keypress.
    pub fn pause(&mut self) -> io::Result<()> {
        self.say("End of program, press Enter key to quit")?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(())
    }

    pub fn output(&self) -> &W {
        &self.output
    }
}
