//! Inline keyboard builder. Callback buttons are encoded through the [`CallbackCodec`] the
//! keyboard was created with; there is no implicit "current bot".

use serde_json::{json, Value};

use crate::action::ActionRef;
use crate::codec::CallbackCodec;
use crate::error::CodecError;

/// `callback_data` of a label-only inline button. The dispatcher skips it.
pub const BLANK_CALLBACK: &str = " ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    Callback { text: String, data: String },
    Url { text: String, url: String },
}

impl Button {
    pub fn to_json(&self) -> Value {
        match self {
            Button::Callback { text, data } => json!({ "text": text, "callback_data": data }),
            Button::Url { text, url } => json!({ "text": text, "url": url }),
        }
    }
}

pub struct InlineKeyboard<'a> {
    codec: &'a CallbackCodec,
    rows: Vec<Vec<Button>>,
}

impl<'a> InlineKeyboard<'a> {
    pub fn new(codec: &'a CallbackCodec) -> Self {
        Self {
            codec,
            rows: vec![Vec::new()],
        }
    }

    /// Button that triggers `action` with `args` when pressed.
    pub fn callback<S: AsRef<str>>(
        mut self,
        text: impl Into<String>,
        action: &ActionRef,
        args: &[S],
    ) -> Result<Self, CodecError> {
        let data = self.codec.encode(action.name(), args)?;
        self.push(Button::Callback {
            text: text.into(),
            data,
        });
        Ok(self)
    }

    /// Button that triggers `action` without arguments.
    pub fn action(self, text: impl Into<String>, action: &ActionRef) -> Result<Self, CodecError> {
        self.callback::<&str>(text, action, &[])
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.push(Button::Callback {
            text: text.into(),
            data: BLANK_CALLBACK.to_string(),
        });
        self
    }

    pub fn url(mut self, text: impl Into<String>, url: impl Into<String>) -> Self {
        self.push(Button::Url {
            text: text.into(),
            url: url.into(),
        });
        self
    }

    /// Starts a new row. Consecutive calls do not create empty rows.
    pub fn row(mut self) -> Self {
        if self.rows.last().is_some_and(|r| !r.is_empty()) {
            self.rows.push(Vec::new());
        }
        self
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Button]> {
        self.rows.iter().filter(|r| !r.is_empty()).map(Vec::as_slice)
    }

    /// `reply_markup` value for the Bot API.
    pub fn build(&self) -> Value {
        let rows: Vec<Value> = self
            .rows()
            .map(|row| Value::Array(row.iter().map(Button::to_json).collect()))
            .collect();
        json!({ "inline_keyboard": rows })
    }

    fn push(&mut self, button: Button) {
        match self.rows.last_mut() {
            Some(row) => row.push(button),
            None => self.rows.push(vec![button]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecConfig;

    const CLICKED: ActionRef = ActionRef::new("clicked");

    #[test]
    fn test_build_rows() {
        let codec = CallbackCodec::new(CodecConfig::unsigned());
        let keyboard = InlineKeyboard::new(&codec)
            .callback("Press", &CLICKED, &["1"])
            .unwrap()
            .text("Label")
            .row()
            .row()
            .url("Docs", "https://core.telegram.org/bots/api");

        assert_eq!(
            keyboard.build(),
            json!({
                "inline_keyboard": [
                    [
                        { "text": "Press", "callback_data": "clicked 1" },
                        { "text": "Label", "callback_data": " " }
                    ],
                    [
                        { "text": "Docs", "url": "https://core.telegram.org/bots/api" }
                    ]
                ]
            })
        );
    }

    #[test]
    fn test_callback_propagates_codec_errors() {
        let codec = CallbackCodec::new(CodecConfig::unsigned());
        let result = InlineKeyboard::new(&codec).callback("x", &CLICKED, &["a b"]);
        assert!(matches!(result, Err(CodecError::ArgContainsSpace(_))));
    }

    #[test]
    fn test_signed_buttons_carry_signature() {
        let codec = CallbackCodec::new(CodecConfig::with_secret("k"));
        let keyboard = InlineKeyboard::new(&codec).action("Go", &CLICKED).unwrap();
        let row = keyboard.rows().next().unwrap();
        match &row[0] {
            Button::Callback { data, .. } => assert!(codec.verify(data)),
            other => panic!("unexpected button {:?}", other),
        }
    }
}
