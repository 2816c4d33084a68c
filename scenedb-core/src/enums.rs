//! Performer attribute enumerations.
//!
//! Stored values are free-form strings that predate validation, so resolving
//! them never fails: anything that is not a known identifier resolves to
//! `None` instead of erroring the whole read.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lenient parsing from a stored string.
pub trait ParseEnum: Sized + 'static {
    /// Every value of the enum, in declaration order.
    const VALUES: &'static [Self];

    /// Wire identifier, e.g. `"NON_BINARY"`.
    fn as_str(&self) -> &'static str;

    /// Resolve a raw value case-insensitively; unknown or empty values give `None`.
    fn parse_enum(raw: &str) -> Option<Self>
    where
        Self: Copy,
    {
        let raw = raw.trim();
        Self::VALUES
            .iter()
            .copied()
            .find(|value| value.as_str().eq_ignore_ascii_case(raw))
    }
}

macro_rules! attribute_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl ParseEnum for $name {
            const VALUES: &'static [Self] = &[$(Self::$variant),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

attribute_enum!(
    /// Performer gender.
    Gender {
        Male => "MALE",
        Female => "FEMALE",
        TransgenderMale => "TRANSGENDER_MALE",
        TransgenderFemale => "TRANSGENDER_FEMALE",
        Intersex => "INTERSEX",
        NonBinary => "NON_BINARY",
    }
);

attribute_enum!(HairColor {
    Blonde => "BLONDE",
    Brunette => "BRUNETTE",
    Black => "BLACK",
    Red => "RED",
    Auburn => "AUBURN",
    Grey => "GREY",
    Bald => "BALD",
    Various => "VARIOUS",
    Other => "OTHER",
});

attribute_enum!(EyeColor {
    Blue => "BLUE",
    Brown => "BROWN",
    Grey => "GREY",
    Green => "GREEN",
    Hazel => "HAZEL",
    Red => "RED",
});

attribute_enum!(Ethnicity {
    Caucasian => "CAUCASIAN",
    Black => "BLACK",
    Asian => "ASIAN",
    Indian => "INDIAN",
    Latin => "LATIN",
    MiddleEastern => "MIDDLE_EASTERN",
    Mixed => "MIXED",
    Other => "OTHER",
});

attribute_enum!(
    /// `Na` covers performers for whom the attribute does not apply.
    BreastType {
        Natural => "NATURAL",
        Fake => "FAKE",
        Na => "NA",
    }
);

/// Performer attributes as persisted: raw, possibly invalid strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformerAttributes {
    pub gender: Option<String>,
    pub hair_color: Option<String>,
    pub eye_color: Option<String>,
    pub ethnicity: Option<String>,
    pub breast_type: Option<String>,
}

impl PerformerAttributes {
    pub fn gender(&self) -> Option<Gender> {
        resolve(&self.gender)
    }

    pub fn hair_color(&self) -> Option<HairColor> {
        resolve(&self.hair_color)
    }

    pub fn eye_color(&self) -> Option<EyeColor> {
        resolve(&self.eye_color)
    }

    pub fn ethnicity(&self) -> Option<Ethnicity> {
        resolve(&self.ethnicity)
    }

    pub fn breast_type(&self) -> Option<BreastType> {
        resolve(&self.breast_type)
    }
}

fn resolve<E: ParseEnum + Copy>(raw: &Option<String>) -> Option<E> {
    raw.as_deref().and_then(E::parse_enum)
}
