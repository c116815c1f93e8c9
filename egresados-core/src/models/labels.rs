//! Tagged categories for the closed-choice survey answers.
//!
//! Each category carries a stable wire key (the value stored in the record
//! store and sent over HTTP) and a fixed human-readable label for the admin
//! surfaces. These replace the ad-hoc string lookup tables of the legacy
//! dashboard.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("valor desconocido para {category}: {value}")]
pub struct UnknownLabel {
    pub category: &'static str,
    pub value: String,
}

macro_rules! label_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($category:literal) {
            $($variant:ident => ($key:literal, $label:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire key, as stored in the record store.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $key),+
                }
            }

            /// Human-readable label for admin surfaces and notifications.
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($key => Ok($name::$variant),)+
                    other => Err(UnknownLabel {
                        category: $category,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

label_enum! {
    /// Academic program of the alumna/alumnus.
    Programa("programa") {
        MaestriaAdministracion => ("maestria_administracion", "Maestría en Administración"),
        MaestriaEducacion => ("maestria_educacion", "Maestría en Educación"),
        MaestriaIngenieria => ("maestria_ingenieria", "Maestría en Ingeniería"),
        DoctoradoCiencias => ("doctorado_ciencias", "Doctorado en Ciencias"),
        DoctoradoHumanidades => ("doctorado_humanidades", "Doctorado en Humanidades"),
        Otro => ("otro", "Otro"),
    }
}

label_enum! {
    /// Preferred dress code / formality for the reunion.
    TipoEvento("tipo_evento") {
        Formal => ("formal", "Formal"),
        Semiformal => ("semiformal", "Semi-formal"),
        Casual => ("casual", "Casual"),
        Tematico => ("tematico", "Temático"),
    }
}

label_enum! {
    /// Preferred time slot.
    Horario("horario") {
        Manana => ("manana", "Mañana (9:00 AM - 12:00 PM)"),
        Tarde => ("tarde", "Tarde (2:00 PM - 6:00 PM)"),
        Noche => ("noche", "Noche (7:00 PM - 11:00 PM)"),
    }
}

label_enum! {
    /// Preferred venue.
    Lugar("lugar") {
        SalonEventos => ("salon_eventos", "Salón de eventos"),
        Hotel => ("hotel", "Hotel"),
        Jardin => ("jardin", "Jardín / Terraza"),
        Restaurante => ("restaurante", "Restaurante"),
        Campus => ("campus", "Campus universitario"),
        Otro => ("otro", "Otro"),
    }
}

label_enum! {
    /// Activities the respondent wants at the event (multi-select).
    Actividad("actividad") {
        Discursos => ("discursos", "Discursos y reconocimientos"),
        Musica => ("musica", "Música en vivo / DJ"),
        Cena => ("cena", "Cena / Banquete"),
        Networking => ("networking", "Networking profesional"),
        Entretenimiento => ("entretenimiento", "Entretenimiento"),
        Fotografia => ("fotografia", "Sesión de fotografía"),
    }
}

label_enum! {
    /// Whether the respondent brings a companion.
    Acompanante("acompanante") {
        Si => ("si", "Sí"),
        No => ("no", "No"),
    }
}
