use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::Deserialize;
use serde::Serialize;

const LEN_PREFIX: usize = 4;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ErasureError {
    #[error("invalid shard configuration: data {data}, total {total}")]
    InvalidConfig { data: usize, total: usize },
    #[error("payload is too large to frame: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("not enough shards: expected {expected}, received {received}")]
    NotEnoughShards { expected: usize, received: usize },
    #[error("shard number {0} is out of range")]
    ShardOutOfRange(u32),
    #[error("reed-solomon: {0}")]
    ReedSolomon(String),
    #[error("decoded frame is malformed")]
    MalformedFrame,
}

/// One erasure coded piece of a payload. `number` is the 0-based position in the codeword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub number: u32,
    pub data: Vec<u8>,
}

fn codec(k: usize, n: usize) -> Result<ReedSolomon, ErasureError> {
    if k == 0 || k >= n {
        return Err(ErasureError::InvalidConfig { data: k, total: n });
    }
    ReedSolomon::new(k, n - k).map_err(|e| ErasureError::ReedSolomon(e.to_string()))
}

/// Encodes `payload` into `n` shards any `k` of which recover it.
/// Frame: 4-byte big-endian payload lenght, payload, zero padding up to a multiple of `k`.
pub fn encode(payload: &[u8], k: usize, n: usize) -> Result<Vec<Shard>, ErasureError> {
    let rs = codec(k, n)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| ErasureError::PayloadTooLarge(payload.len()))?;

    let framed_len = LEN_PREFIX + payload.len();
    let shard_len = framed_len.div_ceil(k);
    let mut frame = Vec::with_capacity(shard_len * k);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    frame.resize(shard_len * k, 0);

    let mut shards: Vec<Vec<u8>> = frame.chunks_exact(shard_len).map(<[u8]>::to_vec).collect();
    shards.resize(n, vec![0; shard_len]);
    rs.encode(&mut shards)
        .map_err(|e| ErasureError::ReedSolomon(e.to_string()))?;

    Ok(shards
        .into_iter()
        .enumerate()
        .map(|(i, data)| Shard {
            number: i as u32,
            data,
        })
        .collect())
}

/// Recovers the payload from at least `k` distinct shards. Extra shards are ignored.
pub fn decode(shards: &[Shard], k: usize, n: usize) -> Result<Vec<u8>, ErasureError> {
    let rs = codec(k, n)?;

    let mut slots: Vec<Option<Vec<u8>>> = vec![None; n];
    let mut present = 0;
    for shard in shards {
        let slot = slots
            .get_mut(shard.number as usize)
            .ok_or(ErasureError::ShardOutOfRange(shard.number))?;
        if slot.is_none() && present < k {
            *slot = Some(shard.data.clone());
            present += 1;
        }
    }
    if present < k {
        return Err(ErasureError::NotEnoughShards {
            expected: k,
            received: present,
        });
    }

    rs.reconstruct_data(&mut slots)
        .map_err(|e| ErasureError::ReedSolomon(e.to_string()))?;

    let mut frame = Vec::new();
    for slot in slots.into_iter().take(k) {
        frame.extend(slot.ok_or(ErasureError::MalformedFrame)?);
    }
    if frame.len() < LEN_PREFIX {
        return Err(ErasureError::MalformedFrame);
    }
    let (prefix, body) = frame.split_at(LEN_PREFIX);
    let mut len = [0u8; LEN_PREFIX];
    len.copy_from_slice(prefix);
    let len = u32::from_be_bytes(len) as usize;
    if len > body.len() {
        return Err(ErasureError::MalformedFrame);
    }

    Ok(body[..len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::Rng;

    #[test]
    fn any_k_shards_recover_the_payload() {
        let mut rng = rand::thread_rng();
        for (k, n, len) in [(2, 4, 0), (4, 7, 1), (4, 7, 333), (6, 16, 1024)] {
            let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let mut shards = encode(&payload, k, n).unwrap();
            assert_eq!(shards.len(), n);

            shards.shuffle(&mut rng);
            assert_eq!(decode(&shards[..k], k, n).unwrap(), payload);
        }
    }

    #[test]
    fn too_few_shards() {
        let shards = encode(b"qualified", 4, 7).unwrap();
        assert_eq!(
            decode(&shards[..3], 4, 7),
            Err(ErasureError::NotEnoughShards {
                expected: 4,
                received: 3
            })
        );

        // duplicates count once
        let dup = vec![shards[0].clone(), shards[0].clone(), shards[1].clone(), shards[2].clone()];
        assert!(matches!(
            decode(&dup, 4, 7),
            Err(ErasureError::NotEnoughShards { .. })
        ));
    }

    #[test]
    fn bad_config() {
        assert_eq!(
            encode(b"x", 0, 4),
            Err(ErasureError::InvalidConfig { data: 0, total: 4 })
        );
        assert_eq!(
            encode(b"x", 4, 4),
            Err(ErasureError::InvalidConfig { data: 4, total: 4 })
        );
        let shard = Shard {
            number: 9,
            data: vec![0],
        };
        assert_eq!(decode(&[shard], 2, 4), Err(ErasureError::ShardOutOfRange(9)));
    }
}
