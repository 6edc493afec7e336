//! Word-pair source for round setup.
//!
//! The game only ever consumes pairs through the [`WordSource`] trait; the
//! built-in dictionary is one implementation, so tests (or a future external
//! dictionary service) can inject their own.

use rand::Rng;
use serde::Serialize;

/// A pair of related but distinct words. In hard mode civilians get one side
/// and impostors the other; in normal mode civilians share one random side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordPair {
    pub word: String,
    pub related: String,
}

pub trait WordSource: Send + Sync {
    /// Draw a pair, optionally restricted to a category. `None` (or an
    /// unknown category name) draws from the mix of all categories.
    fn draw(&self, category: Option<&str>) -> WordPair;
}

/// Static Spanish dictionary of thematically related pairs. The words are
/// related but deliberately not synonyms, so hard-mode impostors get a
/// plausible yet different clue target.
pub struct BuiltinDictionary;

type PairTable = &'static [(&'static str, &'static [(&'static str, &'static str)])];

const PAIRS: PairTable = &[
    (
        "Animales",
        &[
            ("Perro", "Gato"),
            ("León", "Tigre"),
            ("Ballena", "Tiburón"),
            ("Águila", "Halcón"),
            ("Caballo", "Cebra"),
            ("Elefante", "Rinoceronte"),
            ("Mono", "Gorila"),
            ("Delfín", "Orca"),
            ("Serpiente", "Lagarto"),
            ("Abeja", "Avispa"),
        ],
    ),
    (
        "Comida",
        &[
            ("Pizza", "Hamburguesa"),
            ("Sushi", "Ramen"),
            ("Café", "Chocolate"),
            ("Cerveza", "Whisky"),
            ("Helado", "Tarta"),
            ("Pan", "Galleta"),
            ("Leche", "Queso"),
            ("Manzana", "Pera"),
            ("Plátano", "Kiwi"),
            ("Fresa", "Cereza"),
        ],
    ),
    (
        "Lugares",
        &[
            ("Playa", "Montaña"),
            ("Bosque", "Selva"),
            ("Desierto", "Tundra"),
            ("Río", "Océano"),
            ("Lago", "Estanque"),
            ("Volcán", "Géiser"),
            ("Cueva", "Mina"),
            ("Isla", "Península"),
        ],
    ),
    (
        "Transporte",
        &[
            ("Coche", "Moto"),
            ("Avión", "Globo"),
            ("Barco", "Canoa"),
            ("Tren", "Tranvía"),
            ("Bicicleta", "Patinete"),
            ("Autobús", "Taxi"),
            ("Helicóptero", "Dron"),
            ("Submarino", "Batiscafo"),
        ],
    ),
    (
        "Casa",
        &[
            ("Silla", "Taburete"),
            ("Mesa", "Escritorio"),
            ("Cama", "Hamaca"),
            ("Lámpara", "Vela"),
            ("Espejo", "Ventana"),
            ("Libro", "Periódico"),
            ("Cuaderno", "Diario"),
            ("Mochila", "Maleta"),
        ],
    ),
    (
        "Naturaleza",
        &[
            ("Sol", "Fuego"),
            ("Luna", "Estrella"),
            ("Nube", "Niebla"),
            ("Lluvia", "Granizo"),
            ("Nieve", "Escarcha"),
            ("Viento", "Huracán"),
            ("Rayo", "Relámpago"),
            ("Arcoíris", "Aurora"),
            ("Cascada", "Fuente"),
        ],
    ),
    (
        "Tiempo",
        &[
            ("Primavera", "Otoño"),
            ("Verano", "Invierno"),
            ("Día", "Noche"),
            ("Amanecer", "Atardecer"),
            ("Mediodía", "Medianoche"),
        ],
    ),
    (
        "Colores",
        &[
            ("Rojo", "Rosa"),
            ("Azul", "Violeta"),
            ("Verde", "Turquesa"),
            ("Amarillo", "Oro"),
            ("Naranja", "Coral"),
            ("Morado", "Lila"),
            ("Negro", "Gris"),
            ("Blanco", "Plata"),
        ],
    ),
    (
        "Deportes",
        &[
            ("Fútbol", "Hockey"),
            ("Baloncesto", "Balonmano"),
            ("Tenis", "Bádminton"),
            ("Natación", "Buceo"),
            ("Ciclismo", "Motociclismo"),
            ("Voleibol", "Waterpolo"),
            ("Béisbol", "Cricket"),
            ("Golf", "Minigolf"),
            ("Boxeo", "Lucha"),
            ("Karate", "Judo"),
        ],
    ),
    (
        "Tecnología",
        &[
            ("Micrófono", "Megáfono"),
            ("Auriculares", "Altavoz"),
            ("Reloj", "Brújula"),
            ("Móvil", "Tablet"),
            ("Ordenador", "Consola"),
            ("Cámara", "Telescopio"),
            ("Radio", "Televisión"),
        ],
    ),
];

impl WordSource for BuiltinDictionary {
    fn draw(&self, category: Option<&str>) -> WordPair {
        let mut rng = rand::rng();
        let pool: Vec<(&str, &str)> =
            match category.and_then(|c| PAIRS.iter().find(|(name, _)| *name == c)) {
                Some((_, pairs)) => pairs.to_vec(),
                None => PAIRS.iter().flat_map(|(_, ps)| ps.iter().copied()).collect(),
            };

        let (word, related) = pool[rng.random_range(0..pool.len())];
        WordPair {
            word: word.to_string(),
            related: related.to_string(),
        }
    }
}
