//! Display names handed out on `PlayerNameRequest`.

use rand::Rng;
use rand::seq::IndexedRandom;

const ADJECTIVES: &[&str] = &[
    "Funny", "Brave", "Sleepy", "Clever", "Grumpy", "Swift", "Quiet", "Lucky", "Fuzzy", "Bold",
    "Gentle", "Wild", "Curious", "Jolly", "Sneaky", "Mighty",
];

const ANIMALS: &[&str] = &[
    "Fauna", "Otter", "Badger", "Heron", "Lynx", "Marten", "Beaver", "Falcon", "Moose", "Wolf",
    "Hedgehog", "Stork", "Bison", "Raven", "Fox", "Owl",
];

/// An "Adjective Animal" name.
pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Anonymous");
    let animal = ANIMALS.choose(rng).copied().unwrap_or("Player");
    format!("{adjective} {animal}")
}
