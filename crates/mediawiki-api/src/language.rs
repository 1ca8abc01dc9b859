use isolang::Language;
use thiserror::Error;

// Some langs don't have an iso 639-1
#[derive(Error, Debug)]
#[error("Language has no valid iso 639-1 specification")]
pub struct LanguageInvalidError;

/// A language edition of Wikipedia, addressed by its iso 639-1 code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WikiLanguage(Language);

impl WikiLanguage {
    pub fn from_code(code: &str) -> Option<Self> {
        Language::from_639_1(code).map(Self)
    }

    /// # Errors
    ///
    /// This method fails if the language has no iso 639-1 code
    pub fn code(self) -> Result<&'static str, LanguageInvalidError> {
        self.0.to_639_1().ok_or(LanguageInvalidError)
    }

    pub fn name(self) -> &'static str {
        self.0.to_name()
    }

    pub fn language(self) -> Language {
        self.0
    }
}

impl From<Language> for WikiLanguage {
    fn from(language: Language) -> Self {
        Self(language)
    }
}

impl Default for WikiLanguage {
    fn default() -> Self {
        Self(Language::from_639_1("en").expect("Language 'en' does not exist"))
    }
}

#[cfg(test)]
mod test {
    use super::WikiLanguage;

    const TEST_LANGUAGES: [(&str, &str); 10] = [
        ("ar", "Arabic"),
        ("da", "Danish"),
        ("de", "German"),
        ("el", "Greek"),
        ("en", "English"),
        ("eo", "Esperanto"),
        ("es", "Spanish"),
        ("fr", "French"),
        ("ko", "Korean"),
        ("sv", "Swedish"),
    ];

    #[test]
    fn languages_round_trip_their_code() {
        for (iso, name) in TEST_LANGUAGES {
            let language = WikiLanguage::from_code(iso)
                .expect(format!("Iso code '{iso}' is invalid").as_str());

            assert_eq!(
                language.code().expect(
                    format!("Language '{name}' has no iso 639-1 code").as_str()
                ),
                iso
            );
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert!(WikiLanguage::from_code("xx").is_none());
        assert!(WikiLanguage::from_code("").is_none());
    }

    #[test]
    fn the_default_language_is_english() {
        assert_eq!(WikiLanguage::default().name(), "English");
    }
}
