// Wire-level data types shared by the codec and client crates: byte
// cursors, the `Value` tagged union, record identity/digest, and the
// buffer pool (spec §3, §4.1, §9).

mod buf;
mod key;
mod particle;
mod pool;
mod record;
mod value;

pub use buf::{ReadBuf, WriteBuf};
pub use key::{Key, UserKey, DIGEST_LEN};
pub use particle::ParticleType;
pub use pool::{BufferPool, PooledBuf, INLINE_CAPACITY};
pub use record::{Record, Ttl};
pub use value::{BlobSubtype, MapOrder, MapValue, Value};
