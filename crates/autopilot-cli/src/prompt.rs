use anyhow::Result;

pub mod cliclack;

pub trait Prompt {
    /// A piece of the reply as it is generated
    fn render_chunk(&mut self, chunk: &str);
    /// The finished answer for a turn
    fn render_answer(&mut self, answer: &str) -> Result<()>;
    fn render_notice(&mut self, notice: &str);
    fn get_input(&mut self) -> Result<Input>;
    fn ready(&self) {
        println!("\n");
        println!("Autopilot is running! Enter your instructions, or /? for help.");
        println!("\n");
    }
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Only set for messages
}

pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Clear,    // User wants a fresh conversation
    Exit,     // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}
