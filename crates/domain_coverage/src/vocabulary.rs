//! Repair vocabulary for the keyword matcher
//!
//! Each mapping ties a set of multi-language keywords (German, French,
//! English) to a coverage category and component. Context hints are extra
//! terms that, when they also appear in the description, raise confidence
//! slightly.

use serde::{Deserialize, Serialize};

/// One vocabulary entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMapping {
    pub category: String,
    #[serde(default)]
    pub component: Option<String>,
    pub keywords: Vec<String>,
    pub base_confidence: f64,
    #[serde(default)]
    pub context_hints: Vec<String>,
}

impl KeywordMapping {
    pub fn new(category: &str, component: &str, base_confidence: f64) -> Self {
        Self {
            category: category.to_string(),
            component: Some(component.to_string()),
            keywords: Vec::new(),
            base_confidence,
            context_hints: Vec::new(),
        }
    }

    pub fn keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_lowercase()).collect();
        self
    }

    pub fn hints(mut self, hints: &[&str]) -> Self {
        self.context_hints = hints.iter().map(|h| h.to_lowercase()).collect();
        self
    }
}

/// Built-in vocabulary, in registration order
pub fn default_vocabulary() -> Vec<KeywordMapping> {
    vec![
        KeywordMapping::new("turbo_supercharger", "turbocharger", 0.90)
            .keywords(&["turbolader", "turbocompresseur", "turbocharger", "turbo"])
            .hints(&["ladedruck", "abgas", "suralimentation", "boost"]),
        KeywordMapping::new("engine", "cylinder_head", 0.85)
            .keywords(&["zylinderkopf", "culasse", "cylinder head"])
            .hints(&["motor", "moteur", "engine"]),
        KeywordMapping::new("engine", "crankshaft", 0.85)
            .keywords(&["kurbelwelle", "vilebrequin", "crankshaft"])
            .hints(&["motor", "moteur", "engine"]),
        KeywordMapping::new("engine", "camshaft", 0.85)
            .keywords(&["nockenwelle", "arbre à cames", "camshaft"])
            .hints(&["motor", "moteur", "engine"]),
        KeywordMapping::new("engine", "piston", 0.85)
            .keywords(&["kolben", "piston", "pleuel", "bielle", "connecting rod"])
            .hints(&["motor", "moteur", "engine"]),
        KeywordMapping::new("engine", "timing_chain", 0.85)
            .keywords(&["steuerkette", "chaîne de distribution", "timing chain"])
            .hints(&["spanner", "tendeur", "tensioner"]),
        KeywordMapping::new("engine", "egr_valve", 0.85)
            .keywords(&["agr-ventil", "agr ventil", "vanne egr", "egr valve"])
            .hints(&["abgas", "échappement", "exhaust"]),
        KeywordMapping::new("transmission", "gearbox", 0.85)
            .keywords(&["getriebe", "boîte de vitesses", "boite de vitesses", "gearbox", "transmission"])
            .hints(&["automat", "dsg", "wandler", "mechatronik"]),
        KeywordMapping::new("cooling_system", "water_pump", 0.85)
            .keywords(&["wasserpumpe", "pompe à eau", "water pump"])
            .hints(&["kühl", "refroid", "cool"]),
        KeywordMapping::new("cooling_system", "radiator", 0.80)
            .keywords(&["kühler", "radiateur", "radiator"])
            .hints(&["kühlmittel", "refroid", "coolant"]),
        KeywordMapping::new("fuel_system", "injector", 0.85)
            .keywords(&["einspritzdüse", "injektor", "injecteur", "injector"])
            .hints(&["diesel", "benzin", "kraftstoff", "carburant"]),
        KeywordMapping::new("fuel_system", "high_pressure_pump", 0.85)
            .keywords(&["hochdruckpumpe", "pompe haute pression", "high pressure pump"])
            .hints(&["diesel", "kraftstoff", "carburant"]),
        KeywordMapping::new("electrical", "control_unit", 0.80)
            .keywords(&["steuergerät", "calculateur", "control unit"])
            .hints(&["motor", "getriebe", "elektr"]),
        KeywordMapping::new("electrical", "alternator", 0.80)
            .keywords(&["lichtmaschine", "alternateur", "alternator"])
            .hints(&["regler", "régulateur", "12v"]),
        KeywordMapping::new("electrical", "starter", 0.80)
            .keywords(&["anlasser", "démarreur", "starter motor"])
            .hints(&["magnetschalter", "solénoïde", "solenoid"]),
        KeywordMapping::new("steering", "steering_rack", 0.85)
            .keywords(&["lenkgetriebe", "crémaillère", "steering rack"])
            .hints(&["lenk", "direction", "steering"]),
        KeywordMapping::new("steering", "power_steering_pump", 0.85)
            .keywords(&["servopumpe", "pompe de direction", "power steering pump"])
            .hints(&["lenk", "direction", "steering"]),
        KeywordMapping::new("air_conditioning", "ac_compressor", 0.85)
            .keywords(&["klimakompressor", "compresseur de climatisation", "ac compressor"])
            .hints(&["klima", "clim", "a/c"]),
        KeywordMapping::new("exhaust", "catalytic_converter", 0.80)
            .keywords(&["katalysator", "catalyseur", "catalytic converter"])
            .hints(&["abgas", "échappement", "exhaust"]),
        KeywordMapping::new("brakes", "brake_disc", 0.75)
            .keywords(&["bremsscheibe", "disque de frein", "brake disc"])
            .hints(&["vorne", "hinten", "avant", "arrière"]),
        KeywordMapping::new("brakes", "brake_pad", 0.75)
            .keywords(&["bremsbeläge", "bremsbelag", "plaquettes de frein", "brake pad"])
            .hints(&["vorne", "hinten", "avant", "arrière"]),
    ]
}

/// Categories whose labor is covered without a confidence penalty
pub fn default_labor_eligible_categories() -> Vec<String> {
    [
        "engine",
        "turbo_supercharger",
        "transmission",
        "cooling_system",
        "fuel_system",
        "steering",
        "air_conditioning",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}
