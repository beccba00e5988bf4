use crate::plant::Category;
use crate::weather::Weather;
use serde::Serialize;

/// Chance that a plant reacts to the weather during one tick, per weather
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct WeatherOdds {
    pub sunny: f64,
    pub cloudy: f64,
    pub rainy: f64,
}

impl WeatherOdds {
    pub fn for_weather(&self, weather: Weather) -> f64 {
        match weather {
            Weather::Sunny => self.sunny,
            Weather::Cloudy => self.cloudy,
            Weather::Rainy => self.rainy,
        }
    }
}

/// Probability/delta pair for one (category, weather) cell
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TransitionRule {
    pub probability: f64,
    pub delta: i32,
}

const DEFAULT_ODDS: WeatherOdds = WeatherOdds {
    sunny: 0.15,
    cloudy: 0.05,
    rainy: 1.0,
};

/// Per-category weather sensitivity.
pub fn odds(category: Category) -> WeatherOdds {
    match category {
        Category::Tree => WeatherOdds {
            sunny: 0.15,
            cloudy: 0.05,
            rainy: 1.0,
        },
        Category::Flowerbed | Category::VerticalGarden => WeatherOdds {
            sunny: 0.20,
            cloudy: 0.10,
            rainy: 1.0,
        },
        Category::Hedge | Category::Bush => WeatherOdds {
            sunny: 0.10,
            cloudy: 0.02,
            rainy: 1.0,
        },
        Category::Potted => WeatherOdds {
            sunny: 0.25,
            cloudy: 0.15,
            rainy: 1.0,
        },
        Category::Succulent => WeatherOdds {
            sunny: 0.02,
            cloudy: 0.0,
            rainy: 0.5,
        },
        Category::Unknown => DEFAULT_ODDS,
    }
}

/// Level change applied when a plant reacts to the weather.
pub fn delta(weather: Weather) -> i32 {
    match weather {
        Weather::Sunny => -1,
        Weather::Cloudy => -1,
        Weather::Rainy => 3,
    }
}

pub fn rule(category: Category, weather: Weather) -> TransitionRule {
    TransitionRule {
        probability: odds(category).for_weather(weather),
        delta: delta(weather),
    }
}

/// Sunny probability in thousandths, for exact integer loss estimates.
pub fn sunny_permille(category: Category) -> u64 {
    (odds(category).sunny * 1000.0).round() as u64
}
