//! Partition hash-tree (H0..H3) verification (§4.9.1).
//!
//! No file in this PKI describes the cluster hash layout directly (the
//! original tool only ever writes H3 through unchanged during a recrypt,
//! it never recomputes one); this follows the well-documented Wii disc
//! cluster format and is built entirely on [`crate::crypto::aes`] and
//! [`crate::crypto::sha`]'s existing primitives.
//!
//! Layout per 0x8000-byte cluster: a 0x400-byte hash block (AES-CBC
//! decrypted with the title key and a zero IV) followed by 0x7C00 bytes of
//! user data (31 blocks of 0x400 bytes, AES-CBC decrypted with the title
//! key and an IV taken from the *encrypted* hash block at offset 0x3D0).
//! The hash block holds H0[31] (one SHA-1 per data block) at offset 0,
//! H1[8] at 0x280, and H2[8] at 0x340. H1 is replicated identically across
//! every cluster in its 8-cluster subgroup (each entry hashes that
//! subgroup member's H0 table); H2 is replicated across every cluster in
//! its 64-cluster group (each entry hashes that group's subgroup H1
//! table). H3[group] lives outside the clusters, in the partition's H3
//! table, and hashes each group's H2 table.

use crate::crypto::aes::aes128_cbc_decrypt;
use crate::crypto::sha::sha1_digest;
use crate::error::Result;
use crate::reader::Reader;
use crate::util::LBA_SIZE;

const CLUSTER_SIZE: usize = 0x8000;
const CLUSTER_LBAS: u32 = (CLUSTER_SIZE as u64 / LBA_SIZE) as u32;
const HASH_BLOCK_SIZE: usize = 0x400;
const HASH_BLOCK_HEAD_SIZE: usize = if HASH_BLOCK_SIZE < 512 { HASH_BLOCK_SIZE } else { 512 };
const DATA_BLOCK_SIZE: usize = 0x400;
const BLOCKS_PER_CLUSTER: usize = 31;
const CLUSTERS_PER_SUBGROUP: usize = 8;
const SUBGROUPS_PER_GROUP: usize = 8;
const CLUSTERS_PER_GROUP: usize = CLUSTERS_PER_SUBGROUP * SUBGROUPS_PER_GROUP;

const H0_OFFSET: usize = 0x000;
const H1_OFFSET: usize = 0x280;
const H2_OFFSET: usize = 0x340;
const DATA_IV_OFFSET: usize = 0x3D0;

/// Count of hash mismatches found at each tree level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashMismatches {
    pub h0: usize,
    pub h1: usize,
    pub h2: usize,
    pub h3: usize,
}

impl HashMismatches {
    pub fn is_clean(&self) -> bool { self.h0 == 0 && self.h1 == 0 && self.h2 == 0 && self.h3 == 0 }
}

/// Result of verifying one partition's hash tree.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub clusters_checked: usize,
    pub mismatches: HashMismatches,
}

impl VerifyReport {
    pub fn passed(&self) -> bool { self.mismatches.is_clean() }
}

struct DecodedCluster {
    hash_block: [u8; HASH_BLOCK_SIZE],
    data: Vec<u8>,
}

fn decode_cluster(reader: &mut dyn Reader, partition_lba: u32, data_lba: u32, title_key: &[u8; 16]) -> Result<DecodedCluster> {
    let mut raw = vec![0u8; CLUSTER_SIZE];
    reader.read(&mut raw, partition_lba + data_lba, CLUSTER_LBAS)?;

    let mut data_iv = [0u8; 16];
    data_iv.copy_from_slice(&raw[DATA_IV_OFFSET..DATA_IV_OFFSET + 16]);

    let mut hash_block = [0u8; HASH_BLOCK_SIZE];
    hash_block.copy_from_slice(&raw[0..HASH_BLOCK_SIZE]);
    aes128_cbc_decrypt(title_key, &[0u8; 16], &mut hash_block)?;

    let mut data = raw[HASH_BLOCK_SIZE..].to_vec();
    aes128_cbc_decrypt(title_key, &data_iv, &mut data)?;

    Ok(DecodedCluster { hash_block, data })
}

fn check_h0(cluster: &DecodedCluster, mismatches: &mut HashMismatches) {
    for block in 0..BLOCKS_PER_CLUSTER {
        let data_block = &cluster.data[block * DATA_BLOCK_SIZE..(block + 1) * DATA_BLOCK_SIZE];
        let expected = &cluster.hash_block[H0_OFFSET + block * 20..H0_OFFSET + block * 20 + 20];
        if sha1_digest(data_block) != expected {
            mismatches.h0 += 1;
        }
    }
}

/// Verify a partition's H0..H3 hash tree.
///
/// `partition_lba` is the partition header's starting LBA; `data_lba` is
/// the partition data region's starting LBA relative to the partition
/// (i.e. `data_offset` already converted); `cluster_count` is the number
/// of 0x8000-byte clusters covered by `data_size`; `title_key` is the
/// partition's already-decrypted title key; `h3_table` holds one 20-byte
/// SHA-1 entry per group of 64 clusters.
pub fn verify_partition(
    reader: &mut dyn Reader,
    partition_lba: u32,
    data_lba: u32,
    cluster_count: usize,
    title_key: &[u8; 16],
    h3_table: &[u8],
) -> Result<VerifyReport> {
    let mut mismatches = HashMismatches::default();
    let mut clusters_checked = 0usize;

    let group_count = cluster_count.div_ceil(CLUSTERS_PER_GROUP);
    for group in 0..group_count {
        let group_cluster_base = group * CLUSTERS_PER_GROUP;
        let group_clusters = CLUSTERS_PER_GROUP.min(cluster_count - group_cluster_base);
        let subgroup_count = group_clusters.div_ceil(CLUSTERS_PER_SUBGROUP);

        // H2 table for this group, taken from its first cluster (replicated
        // identically across every cluster in the group).
        let mut group_h2 = None;

        for subgroup in 0..subgroup_count {
            let subgroup_cluster_base = group_cluster_base + subgroup * CLUSTERS_PER_SUBGROUP;
            let subgroup_clusters = CLUSTERS_PER_SUBGROUP.min(cluster_count - subgroup_cluster_base);

            // H1 table for this subgroup, taken from its first cluster.
            let mut subgroup_h1 = None;
            let mut h0_tables = Vec::with_capacity(subgroup_clusters);

            for i in 0..subgroup_clusters {
                let cluster_index = subgroup_cluster_base + i;
                let cluster = decode_cluster(reader, partition_lba, data_lba + (cluster_index as u32) * CLUSTER_LBAS, title_key)?;
                clusters_checked += 1;

                check_h0(&cluster, &mut mismatches);
                h0_tables.push(cluster.hash_block[H0_OFFSET..H0_OFFSET + BLOCKS_PER_CLUSTER * 20].to_vec());

                if i == 0 {
                    let mut h1 = [0u8; CLUSTERS_PER_SUBGROUP * 20];
                    h1.copy_from_slice(&cluster.hash_block[H1_OFFSET..H1_OFFSET + CLUSTERS_PER_SUBGROUP * 20]);
                    subgroup_h1 = Some(h1);
                }
                if group_h2.is_none() {
                    let mut h2 = [0u8; SUBGROUPS_PER_GROUP * 20];
                    h2.copy_from_slice(&cluster.hash_block[H2_OFFSET..H2_OFFSET + SUBGROUPS_PER_GROUP * 20]);
                    group_h2 = Some(h2);
                }
            }

            if let Some(h1) = subgroup_h1 {
                for (i, h0_table) in h0_tables.iter().enumerate() {
                    let expected = &h1[i * 20..i * 20 + 20];
                    if sha1_digest(h0_table) != expected {
                        mismatches.h1 += 1;
                    }
                }
            }
        }

        if let Some(h2) = group_h2 {
            // Recompute each subgroup's H1 table hash against this group's H2 entry.
            for subgroup in 0..subgroup_count {
                let subgroup_cluster_base = group_cluster_base + subgroup * CLUSTERS_PER_SUBGROUP;
                let mut raw = vec![0u8; LBA_SIZE as usize];
                reader.read(&mut raw, partition_lba + data_lba + (subgroup_cluster_base as u32) * CLUSTER_LBAS, 1)?;
                let mut hash_block_head = [0u8; HASH_BLOCK_HEAD_SIZE];
                hash_block_head.copy_from_slice(&raw[0..HASH_BLOCK_HEAD_SIZE]);
                aes128_cbc_decrypt(title_key, &[0u8; 16], &mut hash_block_head)?;
                let h1 = &hash_block_head[H1_OFFSET..H1_OFFSET + CLUSTERS_PER_SUBGROUP * 20];
                let expected = &h2[subgroup * 20..subgroup * 20 + 20];
                if sha1_digest(h1) != expected {
                    mismatches.h2 += 1;
                }
            }

            if let Some(entry) = h3_table.get(group * 20..group * 20 + 20) {
                if sha1_digest(&h2) != entry {
                    mismatches.h3 += 1;
                }
            }
        }
    }

    Ok(VerifyReport { clusters_checked, mismatches })
}
