// Particle types, fixed on the wire (spec §6, grounded on the
// original client's `cl_particle_type` in cf_proto.h). That source
// predates CDT/GeoJSON support and only fixes IDs 0-11; `Map`/`List`/
// `GeoJson` below reproduce the IDs the modern Aerospike wire
// protocol assigns them (19/20/23), so containers get a particle type
// of their own instead of being sniffed out of a plain `Blob`'s bytes
// (see `Value::decode`/`Value::encode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParticleType {
    Nil = 0,
    Integer = 1,
    Double = 2,
    String = 3,
    Blob = 4,
    Timestamp = 5,
    Digest = 6,
    JavaBlob = 7,
    CsharpBlob = 8,
    PythonBlob = 9,
    RubyBlob = 10,
    Max = 11,
    Map = 19,
    List = 20,
    GeoJson = 23,
}

impl ParticleType {
    pub fn from_u8(v: u8) -> Option<Self> {
        use ParticleType::*;
        Some(match v {
            0 => Nil,
            1 => Integer,
            2 => Double,
            3 => String,
            4 => Blob,
            5 => Timestamp,
            6 => Digest,
            7 => JavaBlob,
            8 => CsharpBlob,
            9 => PythonBlob,
            10 => RubyBlob,
            11 => Max,
            19 => Map,
            20 => List,
            23 => GeoJson,
            _ => return None,
        })
    }

    pub fn is_language_blob(self) -> bool {
        matches!(
            self,
            ParticleType::JavaBlob
                | ParticleType::CsharpBlob
                | ParticleType::PythonBlob
                | ParticleType::RubyBlob
        )
    }
}
