use std::collections::HashMap;

use tokenizers::models::wordlevel::WordLevel;
use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::pre_tokenizers::PreTokenizerWrapper;
use tokenizers::Tokenizer;

use super::error::TextcatError;

/// Reserved id for words missing from the vocabulary.
pub const UNK_TOKEN: &str = "[UNK]";

/// A token with the whitespace that follows it in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: u32,
    pub text: String,
    pub text_with_ws: String,
}

/// Builds a whitespace/punctuation word-level tokenizer over `words`.
///
/// `[UNK]` always gets id 0; the remaining words are numbered in the order
/// given, duplicates keeping their first id.
pub(crate) fn word_level_tokenizer<I, S>(words: I) -> Result<Tokenizer, TextcatError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut vocab: HashMap<String, u32> = HashMap::new();
    vocab.insert(UNK_TOKEN.to_string(), 0);
    for word in words {
        let word = word.into();
        if word.is_empty() {
            return Err(TextcatError::ValidationError("Vocabulary words cannot be empty".into()));
        }
        let next = vocab.len() as u32;
        vocab.entry(word).or_insert(next);
    }

    let model = WordLevel::builder()
        .vocab(vocab)
        .unk_token(UNK_TOKEN.to_string())
        .build()
        .map_err(|e| TextcatError::TokenizerError(format!("Failed to build vocabulary: {}", e)))?;

    let mut tokenizer = Tokenizer::new(model);
    tokenizer.with_pre_tokenizer(PreTokenizerWrapper::from(Whitespace {}));
    Ok(tokenizer)
}

/// Splits text into tokens suitable for model input.
///
/// Implementors provide the tokenizer and length limit; counting and
/// tokenizing are shared.
pub(crate) trait TokenEncoding {
    /// Returns the initialized tokenizer if available
    fn tokenizer(&self) -> Option<&Tokenizer>;

    /// Returns the maximum number of tokens per document
    fn max_sequence_length(&self) -> Option<usize>;

    /// Counts the number of tokens in the text.
    ///
    /// # Errors
    /// - `TokenizerError` if the tokenizer is not initialized
    /// - `TokenizerError` if the text cannot be encoded
    fn count_tokens(&self, text: &str) -> Result<usize, TextcatError> {
        let tokenizer = self.tokenizer()
            .ok_or_else(|| TextcatError::TokenizerError("Tokenizer not initialized".into()))?;

        tokenizer.encode(text, false)
            .map_err(|e| TextcatError::TokenizerError(e.to_string()))
            .map(|encoding| encoding.get_ids().len())
    }

    /// Converts text into tokens, keeping each token's trailing whitespace.
    ///
    /// # Errors
    /// - `TokenizerError` if the tokenizer is not initialized or encoding fails
    /// - `ValidationError` if the text has no tokens or too many
    fn tokenize(&self, text: &str) -> Result<Vec<Token>, TextcatError> {
        let tokenizer = self.tokenizer()
            .ok_or_else(|| TextcatError::TokenizerError("Tokenizer not initialized".into()))?;
        let max_length = self.max_sequence_length()
            .ok_or_else(|| TextcatError::TokenizerError("Max sequence length not set".into()))?;

        let encoding = tokenizer.encode(text, false)
            .map_err(|e| TextcatError::TokenizerError(e.to_string()))?;
        let ids = encoding.get_ids();
        let offsets = encoding.get_offsets();

        if ids.is_empty() {
            return Err(TextcatError::ValidationError("Input text has no tokens".into()));
        }
        if ids.len() > max_length {
            return Err(TextcatError::ValidationError(format!(
                "Input text too long: {} tokens (max: {}). Consider splitting the text into smaller chunks.",
                ids.len(),
                max_length
            )));
        }

        let mut tokens = Vec::with_capacity(ids.len());
        for (i, (&id, &(start, end))) in ids.iter().zip(offsets.iter()).enumerate() {
            let ws_end = offsets.get(i + 1).map_or(text.len(), |&(next, _)| next);
            let token = text.get(start..end);
            let with_ws = text.get(start..ws_end);
            match (token, with_ws) {
                (Some(token), Some(with_ws)) => tokens.push(Token {
                    id,
                    text: token.to_string(),
                    text_with_ws: with_ws.to_string(),
                }),
                _ => {
                    return Err(TextcatError::TokenizerError(format!(
                        "Invalid token offsets {}..{} for text of {} bytes",
                        start,
                        end,
                        text.len()
                    )))
                }
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        tokenizer: Tokenizer,
        max_length: usize,
    }

    impl TokenEncoding for Fixture {
        fn tokenizer(&self) -> Option<&Tokenizer> {
            Some(&self.tokenizer)
        }

        fn max_sequence_length(&self) -> Option<usize> {
            Some(self.max_length)
        }
    }

    fn fixture(max_length: usize) -> Fixture {
        Fixture {
            tokenizer: word_level_tokenizer(vec!["great", "movie", "!"]).unwrap(),
            max_length,
        }
    }

    #[test]
    fn test_tokens_keep_trailing_whitespace() {
        let tokens = fixture(16).tokenize("great  movie!").unwrap();
        let texts: Vec<_> = tokens.iter().map(|t| t.text_with_ws.as_str()).collect();
        assert_eq!(texts, vec!["great  ", "movie", "!"]);
        assert_eq!(tokens[0].id, 1);
        assert_eq!(tokens[1].text, "movie");
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let tokens = fixture(16).tokenize("terrible movie").unwrap();
        assert_eq!(tokens[0].id, 0);
        assert_eq!(tokens[1].id, 2);
    }

    #[test]
    fn test_length_limit() {
        let result = fixture(2).tokenize("great great great");
        assert!(matches!(result, Err(TextcatError::ValidationError(_))));
        assert_eq!(fixture(2).count_tokens("great great great").unwrap(), 3);
    }

    #[test]
    fn test_whitespace_only_text() {
        let result = fixture(16).tokenize("   ");
        assert!(matches!(result, Err(TextcatError::ValidationError(_))));
    }

    #[test]
    fn test_empty_vocabulary_word() {
        assert!(word_level_tokenizer(vec!["ok", ""]).is_err());
    }
}
