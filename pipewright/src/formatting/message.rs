use owo_colors::OwoColorize;
use serde_json::Value;

/// Either a line of text or a set of labelled values.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Fields(Vec<(String, String)>),
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<&Value> for Message {
    fn from(value: &Value) -> Self {
        match value {
            Value::Object(map) => Message::Fields(
                map.iter()
                    .map(|(k, v)| {
                        let v = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), v)
                    })
                    .collect(),
            ),
            Value::String(s) => Message::Text(s.clone()),
            other => Message::Text(other.to_string()),
        }
    }
}

impl Message {
    pub fn lines(&self) -> Vec<String> {
        match self {
            Message::Text(text) => vec![text.clone()],
            Message::Fields(fields) => fields.iter().map(|(k, v)| format!("{}: {}", k, v)).collect(),
        }
    }
}

/// Prints a message in blue, one line per field.
pub fn log_message(message: &Message) {
    for line in message.lines() {
        println!("{}", line.blue());
    }
}
