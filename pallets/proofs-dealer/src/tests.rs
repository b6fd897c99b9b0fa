use std::collections::BTreeMap;

use codec::Encode;
use frame_support::{assert_noop, assert_ok, dispatch::Pays};
use shp_file_metadata::{ChunkId, ChunkWithId, Fingerprint};
use shp_traits::{ProofSubmittersInterface, ProofsDealerInterface, ReadProvidersInterface};
use shp_types::{AccountId, ProviderId, StorageProofsMerkleTrieLayout, TickNumber};
use sp_core::H256;
use sp_runtime::{traits::BlakeTwo256, DispatchError};
use sp_trie::{
    recorder::Recorder, CompactProof, MemoryDB, Trie, TrieDBBuilder, TrieDBMutBuilder, TrieMut,
};

use crate::{
    mock::*, ChallengesQueue, CustomChallenge, Error, Event, GetChallengeSeedError,
    GetCheckpointChallengesError, KeyProof, PriorityChallengesQueue, Proof, ProofFor,
    ProofSubmissionRecord, ProviderToProofSubmissionRecord, TickToChallengesSeed,
    TickToCheckpointChallenges, TickToProvidersDeadlines,
};

type Layout = StorageProofsMerkleTrieLayout;
type FileMetadata = shp_file_metadata::FileMetadata<32, CHUNK_SIZE, SIZE_TO_CHALLENGES>;

/// Period of 20 ticks with the mock's `StakeToChallengePeriod`.
const STAKE: u128 = 200;
const PERIOD: TickNumber = 20;

fn multiaddresses() -> Vec<Vec<u8>> {
    vec![b"/ip4/127.0.0.1/udp/1234".to_vec()]
}

/// A file merklised in `CHUNK_SIZE` chunks, as a BSP would keep it.
struct TestFile {
    metadata: FileMetadata,
    chunks: MemoryDB<BlakeTwo256>,
    fingerprint: H256,
}

impl TestFile {
    fn new(index: u8, size: usize) -> Self {
        let data = (0..size)
            .map(|i| (i as u8).wrapping_mul(index.wrapping_add(3)))
            .collect::<Vec<_>>();

        let mut chunks = MemoryDB::<BlakeTwo256>::default();
        let mut fingerprint = H256::default();
        {
            let mut trie = TrieDBMutBuilder::<Layout>::new(&mut chunks, &mut fingerprint).build();
            for (id, chunk) in data.chunks(CHUNK_SIZE as usize).enumerate() {
                let chunk_id = ChunkId::new(id as u64);
                let value = ChunkWithId {
                    chunk_id,
                    data: chunk.to_vec(),
                };
                trie.insert(&chunk_id.as_trie_key(), &value.encode())
                    .unwrap();
            }
        }

        let metadata = FileMetadata::new(
            ALICE.encode(),
            b"bucket".to_vec(),
            format!("path/to/file-{}", index).into_bytes(),
            size as u64,
            Fingerprint::from(fingerprint.0),
        )
        .unwrap();

        Self {
            metadata,
            chunks,
            fingerprint,
        }
    }

    fn key(&self) -> H256 {
        self.metadata.file_key::<BlakeTwo256>()
    }

    /// Prove the chunks that `challenges` land on.
    fn prove(&self, challenges: &[H256]) -> MockKeyProof {
        let chunks_count = self.metadata.chunks_count();
        let recorder: Recorder<BlakeTwo256> = Recorder::default();
        {
            let mut trie_recorder = recorder.as_trie_recorder(self.fingerprint);
            let trie = TrieDBBuilder::<Layout>::new(&self.chunks, &self.fingerprint)
                .with_recorder(&mut trie_recorder)
                .build();
            for challenge in challenges {
                let chunk_id = ChunkId::from_challenge(challenge.as_ref(), chunks_count);
                trie.get(&chunk_id.as_trie_key()).unwrap().unwrap();
            }
        }
        let proof = recorder
            .drain_storage_proof()
            .to_compact_proof::<BlakeTwo256>(self.fingerprint)
            .unwrap();

        MockKeyProof::new(self.metadata.clone(), proof)
    }
}

/// The forest of a BSP: one leaf per file, keyed by file key.
struct TestForest {
    files: Vec<TestFile>,
    memdb: MemoryDB<BlakeTwo256>,
    root: H256,
}

impl TestForest {
    fn new(files: Vec<TestFile>) -> Self {
        let mut memdb = MemoryDB::<BlakeTwo256>::default();
        let mut root = H256::default();
        {
            let mut trie = TrieDBMutBuilder::<Layout>::new(&mut memdb, &mut root).build();
            for file in files.iter() {
                trie.insert(file.key().as_ref(), &file.metadata.encode())
                    .unwrap();
            }
        }

        Self { files, memdb, root }
    }

    fn with_files(count: u8) -> Self {
        Self::new(
            (0..count)
                .map(|i| TestFile::new(i, 200 + 50 * i as usize))
                .collect(),
        )
    }

    fn file(&self, key: &H256) -> &TestFile {
        self.files.iter().find(|file| file.key() == *key).unwrap()
    }

    fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.metadata.file_size()).sum()
    }

    /// A proof holding every node of the forest, which answers any challenge and allows any
    /// key to be removed.
    fn prove(&self) -> CompactProof {
        let recorder: Recorder<BlakeTwo256> = Recorder::default();
        {
            let mut trie_recorder = recorder.as_trie_recorder(self.root);
            let trie = TrieDBBuilder::<Layout>::new(&self.memdb, &self.root)
                .with_recorder(&mut trie_recorder)
                .build();
            for file in self.files.iter() {
                trie.get(file.key().as_ref()).unwrap().unwrap();
            }
            for item in trie.iter().unwrap() {
                item.unwrap();
            }
        }
        recorder
            .drain_storage_proof()
            .to_compact_proof::<BlakeTwo256>(self.root)
            .unwrap()
    }
}

/// Build the proof `provider` has to submit next, answering the random challenges of its tick
/// and every checkpoint since its last proof.
fn build_proof(forest: &TestForest, provider: &ProviderId) -> ProofFor<Test> {
    let tick = ProofsDealer::get_next_tick_to_submit_proof_for(provider).unwrap();
    let last_tick_proven = ProofsDealer::get_last_tick_provider_submitted_proof(provider).unwrap();
    let seed = ProofsDealer::get_challenge_seed(tick).unwrap();

    let mut challenges = ProofsDealer::generate_challenges_from_seed(seed, provider, 4);
    let mut checkpoints = TickToCheckpointChallenges::<Test>::iter()
        .filter(|(checkpoint_tick, _)| *checkpoint_tick > last_tick_proven && *checkpoint_tick <= tick)
        .collect::<Vec<_>>();
    checkpoints.sort_by_key(|(checkpoint_tick, _)| *checkpoint_tick);
    for (_, checkpoint) in checkpoints {
        challenges.extend(checkpoint.iter().map(|challenge| challenge.key));
    }
    let challenges = challenges
        .into_iter()
        .map(|challenge| (challenge, None))
        .collect::<Vec<_>>();

    let forest_proof = forest.prove();
    let proven =
        ProofsDealer::verify_generic_forest_proof(&forest.root, &challenges, &forest_proof).unwrap();

    let key_proofs = proven
        .iter()
        .map(|file_key| {
            let file = forest.file(file_key);
            let challenge_count = file.metadata.chunks_to_check();
            let key_challenges =
                ProofsDealer::generate_challenges_from_seed(seed, file_key, challenge_count);
            (
                *file_key,
                KeyProof {
                    proof: file.prove(&key_challenges),
                    challenge_count,
                },
            )
        })
        .collect();

    Proof {
        forest_proof,
        key_proofs,
    }
}

fn empty_proof() -> ProofFor<Test> {
    Proof {
        forest_proof: CompactProof {
            encoded_nodes: Vec::new(),
        },
        key_proofs: BTreeMap::new(),
    }
}

fn sign_up_alice_bsp() {
    assert_ok!(StorageProviders::force_bsp_sign_up(
        RuntimeOrigin::root(),
        ALICE,
        ALICE_BSP,
        100_000,
        multiaddresses(),
        STAKE
    ));
}

/// Alice's BSP storing `forest`, with its challenge cycle initialised at tick 1.
fn setup_alice_storing(forest: &TestForest) {
    sign_up_alice_bsp();
    set_bsp_forest(forest.root, forest.total_size());

    run_to_tick(1);
    assert_ok!(ProofsDealer::force_initialise_challenge_cycle(
        RuntimeOrigin::root(),
        ALICE_BSP
    ));
}

/// Alice's BSP storing a forest of five files, with its challenge cycle initialised at tick 1.
fn setup_alice_storing_files() -> TestForest {
    let forest = TestForest::with_files(5);
    setup_alice_storing(&forest);
    forest
}

fn submission_record(provider: &ProviderId) -> Option<ProofSubmissionRecord> {
    ProviderToProofSubmissionRecord::<Test>::get(provider)
}

mod challenges_ticker {
    use super::*;

    #[test]
    fn ticker_advances_and_generates_a_seed_every_tick() {
        new_test_ext().execute_with(|| {
            run_to_tick(3);

            assert_eq!(ProofsDealer::get_current_tick(), 3);

            let seed = ProofsDealer::get_challenge_seed(3).unwrap();
            System::assert_last_event(
                Event::NewChallengeSeed {
                    challenges_ticker: 3,
                    seed,
                }
                .into(),
            );
            assert_ne!(seed, ProofsDealer::get_challenge_seed(2).unwrap());
        });
    }

    #[test]
    fn seeds_are_the_same_for_every_participant() {
        let seeds = || {
            new_test_ext().execute_with(|| {
                run_to_tick(5);
                (1..=5)
                    .map(|tick| ProofsDealer::get_challenge_seed(tick).unwrap())
                    .collect::<Vec<_>>()
            })
        };

        assert_eq!(seeds(), seeds());
    }

    #[test]
    fn paused_ticker_does_not_advance() {
        new_test_ext().execute_with(|| {
            run_to_tick(2);

            assert_noop!(
                ProofsDealer::set_paused(RuntimeOrigin::signed(ALICE), true),
                DispatchError::BadOrigin
            );
            assert_ok!(ProofsDealer::set_paused(RuntimeOrigin::root(), true));
            System::assert_last_event(Event::ChallengesTickerSet { paused: true }.into());

            next_block();
            next_block();
            assert_eq!(ProofsDealer::get_current_tick(), 2);

            assert_ok!(ProofsDealer::set_paused(RuntimeOrigin::root(), false));
            next_block();
            assert_eq!(ProofsDealer::get_current_tick(), 3);
        });
    }

    #[test]
    fn seeds_out_of_the_history_are_pruned() {
        new_test_ext().execute_with(|| {
            run_to_tick(40);

            assert_eq!(
                ProofsDealer::get_challenge_seed(9),
                Err(GetChallengeSeedError::TickBeyondLastSeedStored)
            );
            assert!(ProofsDealer::get_challenge_seed(10).is_ok());
            assert!(ProofsDealer::get_challenge_seed(40).is_ok());
            assert_eq!(
                ProofsDealer::get_challenge_seed(41),
                Err(GetChallengeSeedError::TickIsInTheFuture)
            );
            assert_eq!(
                TickToChallengesSeed::<Test>::iter().count() as TickNumber,
                CHALLENGE_HISTORY_LENGTH + 1
            );
        });
    }

    #[test]
    fn challenges_from_a_seed_are_deterministic_and_provider_specific() {
        let seed = H256::repeat_byte(7);

        let alice = ProofsDealer::generate_challenges_from_seed(seed, &ALICE_BSP, 4);
        assert_eq!(alice.len(), 4);
        assert_eq!(
            alice,
            ProofsDealer::generate_challenges_from_seed(seed, &ALICE_BSP, 4)
        );

        let other = ProofsDealer::generate_challenges_from_seed(seed, &H256::repeat_byte(12), 4);
        assert!(alice.iter().all(|challenge| !other.contains(challenge)));
    }
}

mod challenge {
    use super::*;

    #[test]
    fn challenge_from_user_is_charged_and_queued() {
        new_test_ext().execute_with(|| {
            let key = H256::repeat_byte(1);

            assert_ok!(ProofsDealer::challenge(RuntimeOrigin::signed(BOB), key));

            assert_eq!(ChallengesQueue::<Test>::get(), vec![key]);
            assert_eq!(Balances::free_balance(&BOB), 1_000 - CHALLENGES_FEE);
            assert_eq!(Balances::free_balance(&TREASURY), 1 + CHALLENGES_FEE);
            System::assert_last_event(
                Event::NewChallenge {
                    who: BOB,
                    key_challenged: key,
                }
                .into(),
            );
        });
    }

    #[test]
    fn challenge_from_provider_is_free() {
        new_test_ext().execute_with(|| {
            sign_up_alice_bsp();
            let free = Balances::free_balance(&ALICE);

            assert_ok!(ProofsDealer::challenge(
                RuntimeOrigin::signed(ALICE),
                H256::repeat_byte(1)
            ));

            assert_eq!(Balances::free_balance(&ALICE), free);
            assert_eq!(ChallengesQueue::<Test>::get().len(), 1);
        });
    }

    #[test]
    fn challenging_a_queued_key_again_is_not_charged() {
        new_test_ext().execute_with(|| {
            let key = H256::repeat_byte(1);
            assert_ok!(ProofsDealer::challenge(RuntimeOrigin::signed(BOB), key));
            assert_ok!(ProofsDealer::challenge(RuntimeOrigin::signed(BOB), key));

            assert_eq!(ChallengesQueue::<Test>::get(), vec![key]);
            assert_eq!(Balances::free_balance(&BOB), 1_000 - CHALLENGES_FEE);
        });
    }

    #[test]
    fn challenge_fails_when_queue_is_full() {
        new_test_ext().execute_with(|| {
            for i in 1..=3 {
                assert_ok!(ProofsDealer::challenge(
                    RuntimeOrigin::signed(BOB),
                    H256::repeat_byte(i)
                ));
            }

            assert_noop!(
                ProofsDealer::challenge(RuntimeOrigin::signed(BOB), H256::repeat_byte(4)),
                Error::<Test>::ChallengesQueueOverflow
            );
        });
    }

    #[test]
    fn challenge_fails_if_fee_cannot_be_paid() {
        new_test_ext().execute_with(|| {
            let penniless = AccountId::new([4u8; 32]);

            assert_noop!(
                ProofsDealer::challenge(RuntimeOrigin::signed(penniless), H256::repeat_byte(1)),
                Error::<Test>::FeeChargeFailed
            );
        });
    }

    #[test]
    fn priority_challenge_requires_root_and_has_its_own_limit() {
        new_test_ext().execute_with(|| {
            assert_noop!(
                ProofsDealer::priority_challenge(
                    RuntimeOrigin::signed(ALICE),
                    H256::repeat_byte(1),
                    true
                ),
                DispatchError::BadOrigin
            );

            for i in 1..=3 {
                assert_ok!(ProofsDealer::priority_challenge(
                    RuntimeOrigin::root(),
                    H256::repeat_byte(i),
                    true
                ));
            }
            System::assert_last_event(
                Event::NewPriorityChallenge {
                    key_challenged: H256::repeat_byte(3),
                    should_remove_key: true,
                }
                .into(),
            );

            // The same key is not queued twice.
            assert_ok!(ProofsDealer::priority_challenge(
                RuntimeOrigin::root(),
                H256::repeat_byte(1),
                false
            ));
            assert_eq!(PriorityChallengesQueue::<Test>::get().len(), 3);

            assert_noop!(
                ProofsDealer::priority_challenge(
                    RuntimeOrigin::root(),
                    H256::repeat_byte(4),
                    true
                ),
                Error::<Test>::PriorityChallengesQueueOverflow
            );
        });
    }
}

mod checkpoint {
    use super::*;

    #[test]
    fn checkpoint_includes_priority_challenges_first() {
        new_test_ext().execute_with(|| {
            let regular = [H256::repeat_byte(1), H256::repeat_byte(2)];
            let priority = [H256::repeat_byte(3), H256::repeat_byte(4)];
            for key in regular {
                assert_ok!(ProofsDealer::challenge(RuntimeOrigin::signed(BOB), key));
            }
            for key in priority {
                assert_ok!(ProofsDealer::priority_challenge(
                    RuntimeOrigin::root(),
                    key,
                    true
                ));
            }

            run_to_tick(CHECKPOINT_CHALLENGE_PERIOD - 1);
            assert_eq!(ProofsDealer::get_last_checkpoint_challenge_tick(), 0);

            // First checkpoint: only the priority challenges fit.
            run_to_tick(CHECKPOINT_CHALLENGE_PERIOD);
            let expected = priority
                .iter()
                .map(|key| CustomChallenge {
                    key: *key,
                    should_remove_key: true,
                })
                .collect::<Vec<_>>();
            assert_eq!(
                ProofsDealer::get_checkpoint_challenges(CHECKPOINT_CHALLENGE_PERIOD),
                Ok(expected.clone())
            );
            System::assert_has_event(
                Event::NewCheckpointChallenge {
                    challenges_ticker: CHECKPOINT_CHALLENGE_PERIOD,
                    challenges: expected,
                }
                .into(),
            );
            assert!(PriorityChallengesQueue::<Test>::get().is_empty());
            assert_eq!(ChallengesQueue::<Test>::get().len(), 2);

            // Second checkpoint: the regular ones, which never remove keys.
            run_to_tick(2 * CHECKPOINT_CHALLENGE_PERIOD);
            assert_eq!(
                ProofsDealer::get_checkpoint_challenges(2 * CHECKPOINT_CHALLENGE_PERIOD),
                Ok(regular
                    .iter()
                    .map(|key| CustomChallenge {
                        key: *key,
                        should_remove_key: false,
                    })
                    .collect())
            );
            assert!(ChallengesQueue::<Test>::get().is_empty());
        });
    }

    #[test]
    fn checkpoint_queries_report_why_there_are_no_challenges() {
        new_test_ext().execute_with(|| {
            run_to_tick(CHECKPOINT_CHALLENGE_PERIOD + 1);

            assert_eq!(
                ProofsDealer::get_checkpoint_challenges(CHECKPOINT_CHALLENGE_PERIOD),
                Ok(Vec::new())
            );
            assert_eq!(
                ProofsDealer::get_checkpoint_challenges(CHECKPOINT_CHALLENGE_PERIOD - 1),
                Err(GetCheckpointChallengesError::NoCheckpointChallengesInTick)
            );
            assert_eq!(
                ProofsDealer::get_checkpoint_challenges(CHECKPOINT_CHALLENGE_PERIOD + 1),
                Err(GetCheckpointChallengesError::TickGreaterThanLastCheckpointTick)
            );
        });
    }

    #[test]
    fn checkpoints_out_of_the_history_are_pruned() {
        new_test_ext().execute_with(|| {
            run_to_tick(5 * CHECKPOINT_CHALLENGE_PERIOD);

            let mut stored = TickToCheckpointChallenges::<Test>::iter_keys().collect::<Vec<_>>();
            stored.sort();
            assert_eq!(stored, vec![20, 30, 40, 50]);
        });
    }
}

mod challenge_cycle {
    use super::*;

    #[test]
    fn initialise_challenge_cycle_sets_first_deadline() {
        new_test_ext().execute_with(|| {
            sign_up_alice_bsp();
            run_to_tick(3);

            assert_ok!(ProofsDealer::force_initialise_challenge_cycle(
                RuntimeOrigin::root(),
                ALICE_BSP
            ));

            assert_eq!(ProofsDealer::get_challenge_period(&ALICE_BSP), Ok(PERIOD));
            assert_eq!(
                submission_record(&ALICE_BSP),
                Some(ProofSubmissionRecord {
                    last_tick_proven: 3,
                    next_tick_to_submit_proof_for: 3 + PERIOD,
                })
            );
            let deadline = 3 + PERIOD + CHALLENGE_TICKS_TOLERANCE;
            assert_eq!(ProofsDealer::get_next_deadline_tick(&ALICE_BSP), Some(deadline));
            assert!(TickToProvidersDeadlines::<Test>::contains_key(
                deadline, ALICE_BSP
            ));
            System::assert_last_event(
                Event::NewChallengeCycleInitialised {
                    current_tick: 3,
                    next_challenge_deadline: deadline,
                    provider: ALICE_BSP,
                }
                .into(),
            );
        });
    }

    #[test]
    fn reinitialising_replaces_the_previous_deadline() {
        new_test_ext().execute_with(|| {
            sign_up_alice_bsp();
            run_to_tick(1);
            assert_ok!(ProofsDealer::initialise_challenge_cycle(&ALICE_BSP));
            run_to_tick(4);
            assert_ok!(ProofsDealer::initialise_challenge_cycle(&ALICE_BSP));

            assert_eq!(TickToProvidersDeadlines::<Test>::iter().count(), 1);
            assert!(TickToProvidersDeadlines::<Test>::contains_key(
                4 + PERIOD + CHALLENGE_TICKS_TOLERANCE,
                ALICE_BSP
            ));
        });
    }

    #[test]
    fn only_providers_have_a_challenge_cycle() {
        new_test_ext().execute_with(|| {
            assert_noop!(
                ProofsDealer::force_initialise_challenge_cycle(RuntimeOrigin::root(), ALICE_BSP),
                Error::<Test>::NotProvider
            );
            assert_eq!(
                ProofsDealer::get_challenge_period(&ALICE_BSP),
                Err(crate::GetChallengePeriodError::ProviderNotRegistered)
            );
        });
    }

    #[test]
    fn stopped_challenge_cycle_has_no_deadline() {
        new_test_ext().execute_with(|| {
            setup_alice_storing_files();

            assert_ok!(ProofsDealer::stop_challenge_cycle(&ALICE_BSP));

            assert_eq!(ProviderToProofSubmissionRecord::<Test>::iter().count(), 0);
            assert_eq!(TickToProvidersDeadlines::<Test>::iter().count(), 0);
        });
    }
}

mod submit_proof {
    use super::*;

    #[test]
    fn valid_proof_is_accepted_and_moves_the_deadline() {
        new_test_ext().execute_with(|| {
            let forest = setup_alice_storing_files();
            let tick_to_prove = 1 + PERIOD;
            run_to_tick(tick_to_prove);

            let proof = build_proof(&forest, &ALICE_BSP);
            let info =
                ProofsDealer::submit_proof(RuntimeOrigin::signed(ALICE), proof, None).unwrap();

            // Valid proofs are free.
            assert_eq!(info.pays_fee, Pays::No);
            System::assert_last_event(
                Event::ProofAccepted {
                    provider_id: ALICE_BSP,
                    last_tick_proven: tick_to_prove,
                }
                .into(),
            );
            assert_eq!(
                submission_record(&ALICE_BSP),
                Some(ProofSubmissionRecord {
                    last_tick_proven: tick_to_prove,
                    next_tick_to_submit_proof_for: tick_to_prove + PERIOD,
                })
            );

            assert!(!TickToProvidersDeadlines::<Test>::contains_key(
                tick_to_prove + CHALLENGE_TICKS_TOLERANCE,
                ALICE_BSP
            ));
            assert!(TickToProvidersDeadlines::<Test>::contains_key(
                tick_to_prove + PERIOD + CHALLENGE_TICKS_TOLERANCE,
                ALICE_BSP
            ));

            assert!(ProofsDealer::get_proof_submitters_for_tick(&tick_to_prove)
                .unwrap()
                .contains(&ALICE_BSP));

            // The forest is untouched.
            assert_eq!(StorageProviders::get_root(&ALICE_BSP), Some(forest.root));
        });
    }

    #[test]
    fn provider_can_be_given_explicitly() {
        new_test_ext().execute_with(|| {
            let forest = setup_alice_storing_files();
            run_to_tick(1 + PERIOD);

            let proof = build_proof(&forest, &ALICE_BSP);
            assert_ok!(ProofsDealer::submit_proof(
                RuntimeOrigin::signed(BOB),
                proof,
                Some(ALICE_BSP)
            ));
        });
    }

    #[test]
    fn submitter_must_be_a_provider() {
        new_test_ext().execute_with(|| {
            run_to_tick(1);

            assert_noop!(
                ProofsDealer::submit_proof(RuntimeOrigin::signed(BOB), empty_proof(), None),
                Error::<Test>::NotProvider
            );
            assert_noop!(
                ProofsDealer::submit_proof(
                    RuntimeOrigin::signed(BOB),
                    empty_proof(),
                    Some(H256::repeat_byte(77))
                ),
                Error::<Test>::NotProvider
            );
        });
    }

    #[test]
    fn provider_without_challenge_cycle_cannot_submit() {
        new_test_ext().execute_with(|| {
            sign_up_alice_bsp();
            run_to_tick(1);

            assert_noop!(
                ProofsDealer::submit_proof(RuntimeOrigin::signed(ALICE), empty_proof(), None),
                Error::<Test>::NoRecordOfLastSubmittedProof
            );
        });
    }

    #[test]
    fn provider_with_empty_forest_cannot_submit() {
        new_test_ext().execute_with(|| {
            sign_up_alice_bsp();
            run_to_tick(1);
            assert_ok!(ProofsDealer::initialise_challenge_cycle(&ALICE_BSP));
            run_to_tick(1 + PERIOD);

            assert_noop!(
                ProofsDealer::submit_proof(RuntimeOrigin::signed(ALICE), empty_proof(), None),
                Error::<Test>::ZeroRoot
            );
        });
    }

    #[test]
    fn proof_before_its_tick_is_rejected() {
        new_test_ext().execute_with(|| {
            setup_alice_storing_files();
            run_to_tick(PERIOD);

            assert_noop!(
                ProofsDealer::submit_proof(RuntimeOrigin::signed(ALICE), empty_proof(), None),
                Error::<Test>::ChallengesTickNotReached
            );
        });
    }

    #[test]
    fn proof_after_its_tolerance_window_is_rejected() {
        new_test_ext().execute_with(|| {
            setup_alice_storing_files();
            run_to_tick(1 + PERIOD);

            // A record that lags behind its own deadline.
            ProviderToProofSubmissionRecord::<Test>::insert(
                ALICE_BSP,
                ProofSubmissionRecord {
                    last_tick_proven: 1,
                    next_tick_to_submit_proof_for: 1 + PERIOD - CHALLENGE_TICKS_TOLERANCE,
                },
            );

            assert_noop!(
                ProofsDealer::submit_proof(RuntimeOrigin::signed(ALICE), empty_proof(), None),
                Error::<Test>::ChallengesTickTooLate
            );
        });
    }

    #[test]
    fn forest_proof_for_another_forest_is_rejected() {
        new_test_ext().execute_with(|| {
            let forest = setup_alice_storing_files();
            run_to_tick(1 + PERIOD);

            let mut proof = build_proof(&forest, &ALICE_BSP);
            proof.forest_proof = TestForest::with_files(3).prove();

            assert_noop!(
                ProofsDealer::submit_proof(RuntimeOrigin::signed(ALICE), proof, None),
                Error::<Test>::ForestProofVerificationFailed
            );
        });
    }

    #[test]
    fn extra_key_proofs_are_rejected() {
        new_test_ext().execute_with(|| {
            let forest = setup_alice_storing_files();
            run_to_tick(1 + PERIOD);

            let mut proof = build_proof(&forest, &ALICE_BSP);
            let (_, any_key_proof) = proof.key_proofs.iter().next().unwrap();
            let any_key_proof = any_key_proof.clone();
            proof
                .key_proofs
                .insert(H256::repeat_byte(0xaa), any_key_proof);

            assert_noop!(
                ProofsDealer::submit_proof(RuntimeOrigin::signed(ALICE), proof, None),
                Error::<Test>::IncorrectNumberOfKeyProofs
            );
        });
    }

    #[test]
    fn key_proof_of_another_file_is_rejected() {
        new_test_ext().execute_with(|| {
            let forest = setup_alice_storing_files();
            run_to_tick(1 + PERIOD);

            let mut proof = build_proof(&forest, &ALICE_BSP);
            let key_proof = proof.key_proofs.values_mut().next().unwrap();
            key_proof.proof = TestFile::new(9, 300).prove(&[H256::zero()]);

            assert_noop!(
                ProofsDealer::submit_proof(RuntimeOrigin::signed(ALICE), proof, None),
                Error::<Test>::KeyProofVerificationFailed
            );
        });
    }

    #[test]
    fn checkpoint_challenge_removes_the_key_from_the_forest() {
        new_test_ext().execute_with(|| {
            let forest = setup_alice_storing_files();
            let removed = forest.files[2].key();
            let removed_size = forest.files[2].metadata.file_size();

            assert_ok!(ProofsDealer::priority_challenge(
                RuntimeOrigin::root(),
                removed,
                true
            ));
            run_to_tick(1 + PERIOD);

            let proof = build_proof(&forest, &ALICE_BSP);
            assert!(proof.key_proofs.contains_key(&removed));
            assert_ok!(ProofsDealer::submit_proof(
                RuntimeOrigin::signed(ALICE),
                proof,
                None
            ));

            let expected_root = TestForest::new(
                (0..5u8)
                    .filter(|i| *i != 2)
                    .map(|i| TestFile::new(i, 200 + 50 * i as usize))
                    .collect(),
            )
            .root;
            assert_eq!(StorageProviders::get_root(&ALICE_BSP), Some(expected_root));
            assert_eq!(
                StorageProviders::get_used_capacity(&ALICE_BSP),
                forest.total_size() - removed_size
            );
            System::assert_has_event(
                Event::MutationsAppliedForProvider {
                    provider_id: ALICE_BSP,
                    removed_keys: vec![removed],
                    old_root: forest.root,
                    new_root: expected_root,
                }
                .into(),
            );
        });
    }

    #[test]
    fn removing_the_last_file_stops_the_challenge_cycle() {
        new_test_ext().execute_with(|| {
            let forest = TestForest::with_files(1);
            setup_alice_storing(&forest);
            let only_file = forest.files[0].key();
            let deadline = 1 + PERIOD + CHALLENGE_TICKS_TOLERANCE;

            assert_ok!(ProofsDealer::priority_challenge(
                RuntimeOrigin::root(),
                only_file,
                true
            ));
            run_to_tick(1 + PERIOD);

            let proof = build_proof(&forest, &ALICE_BSP);
            assert_ok!(ProofsDealer::submit_proof(
                RuntimeOrigin::signed(ALICE),
                proof,
                None
            ));
            System::assert_last_event(
                Event::ProofAccepted {
                    provider_id: ALICE_BSP,
                    last_tick_proven: 1 + PERIOD,
                }
                .into(),
            );

            // The forest is empty and nothing is left to prove.
            assert_eq!(
                StorageProviders::get_root(&ALICE_BSP),
                Some(StorageProviders::get_default_root())
            );
            assert_eq!(StorageProviders::get_used_capacity(&ALICE_BSP), 0);
            assert_eq!(submission_record(&ALICE_BSP), None);
            assert_eq!(TickToProvidersDeadlines::<Test>::iter().count(), 0);

            // The proof still counts as submitted.
            assert!(ProofsDealer::get_proof_submitters_for_tick(&(1 + PERIOD))
                .unwrap()
                .contains(&ALICE_BSP));

            // Reaching the old deadline does not make the BSP slashable.
            run_to_tick(deadline + PERIOD);
            assert_eq!(
                ProofsDealer::get_accrued_failed_proof_submissions(&ALICE_BSP),
                None
            );
        });
    }
}

mod slashable_providers {
    use super::*;

    #[test]
    fn missed_deadline_marks_provider_slashable() {
        new_test_ext().execute_with(|| {
            setup_alice_storing_files();
            let deadline = 1 + PERIOD + CHALLENGE_TICKS_TOLERANCE;

            run_to_tick(deadline - 1);
            assert_eq!(
                ProofsDealer::get_accrued_failed_proof_submissions(&ALICE_BSP),
                None
            );

            run_to_tick(deadline);
            assert_eq!(
                ProofsDealer::get_accrued_failed_proof_submissions(&ALICE_BSP),
                Some(1)
            );
            System::assert_has_event(
                Event::SlashableProvider {
                    provider: ALICE_BSP,
                    next_challenge_deadline: deadline + PERIOD,
                }
                .into(),
            );

            // The missed tick counts as proven for the next proof.
            assert_eq!(
                submission_record(&ALICE_BSP),
                Some(ProofSubmissionRecord {
                    last_tick_proven: 1 + PERIOD,
                    next_tick_to_submit_proof_for: 1 + 2 * PERIOD,
                })
            );

            // Missing the next one accrues another failure.
            run_to_tick(deadline + PERIOD);
            assert_eq!(
                ProofsDealer::get_accrued_failed_proof_submissions(&ALICE_BSP),
                Some(2)
            );
        });
    }

    #[test]
    fn proof_after_missed_deadlines_answers_checkpoints_still_in_the_history() {
        new_test_ext().execute_with(|| {
            let forest = setup_alice_storing_files();
            let removed = forest.files[1].key();

            // Three missed deadlines, at ticks 26, 46 and 66.
            run_to_tick(1 + 3 * PERIOD + CHALLENGE_TICKS_TOLERANCE);
            assert_eq!(
                ProofsDealer::get_accrued_failed_proof_submissions(&ALICE_BSP),
                Some(3)
            );
            let record = submission_record(&ALICE_BSP).unwrap();
            assert_eq!(
                record,
                ProofSubmissionRecord {
                    last_tick_proven: 1 + 3 * PERIOD,
                    next_tick_to_submit_proof_for: 1 + 4 * PERIOD,
                }
            );

            // Every checkpoint the next proof answers is still stored.
            let history_start = record.next_tick_to_submit_proof_for - CHALLENGE_HISTORY_LENGTH;
            assert!(record.last_tick_proven >= history_start);

            // Removal requested in the checkpoint at tick 70.
            assert_ok!(ProofsDealer::priority_challenge(
                RuntimeOrigin::root(),
                removed,
                true
            ));
            run_to_tick(1 + 4 * PERIOD);
            assert_eq!(
                ProofsDealer::checkpoint_challenges_to_answer(
                    record.last_tick_proven,
                    record.next_tick_to_submit_proof_for
                ),
                vec![CustomChallenge {
                    key: removed,
                    should_remove_key: true,
                }]
            );

            let proof = build_proof(&forest, &ALICE_BSP);
            assert_ok!(ProofsDealer::submit_proof(
                RuntimeOrigin::signed(ALICE),
                proof,
                None
            ));

            let expected_root = TestForest::new(
                (0..5u8)
                    .filter(|i| *i != 1)
                    .map(|i| TestFile::new(i, 200 + 50 * i as usize))
                    .collect(),
            )
            .root;
            assert_eq!(StorageProviders::get_root(&ALICE_BSP), Some(expected_root));
            assert_eq!(
                submission_record(&ALICE_BSP),
                Some(ProofSubmissionRecord {
                    last_tick_proven: 1 + 4 * PERIOD,
                    next_tick_to_submit_proof_for: 1 + 5 * PERIOD,
                })
            );
        });
    }

    #[test]
    fn slashable_provider_is_slashed_by_the_registry() {
        new_test_ext().execute_with(|| {
            setup_alice_storing_files();
            run_to_tick(1 + PERIOD + CHALLENGE_TICKS_TOLERANCE);

            assert_ok!(StorageProviders::slash(RuntimeOrigin::signed(BOB), ALICE_BSP));

            assert_eq!(StorageProviders::get_stake(&ALICE_BSP), Some(STAKE - 30));
            assert_eq!(
                ProofsDealer::get_accrued_failed_proof_submissions(&ALICE_BSP),
                None
            );
        });
    }

    #[test]
    fn signed_off_provider_is_dropped_at_its_deadline() {
        new_test_ext().execute_with(|| {
            sign_up_alice_bsp();
            run_to_tick(1);
            assert_ok!(ProofsDealer::initialise_challenge_cycle(&ALICE_BSP));
            assert_ok!(StorageProviders::bsp_sign_off(RuntimeOrigin::signed(ALICE)));

            run_to_tick(1 + PERIOD + CHALLENGE_TICKS_TOLERANCE);

            assert_eq!(
                ProofsDealer::get_accrued_failed_proof_submissions(&ALICE_BSP),
                None
            );
            assert_eq!(submission_record(&ALICE_BSP), None);
        });
    }

    #[test]
    fn proof_submitters_are_kept_for_the_history_length() {
        new_test_ext().execute_with(|| {
            let forest = setup_alice_storing_files();
            run_to_tick(1 + PERIOD);
            let proof = build_proof(&forest, &ALICE_BSP);
            assert_ok!(ProofsDealer::submit_proof(
                RuntimeOrigin::signed(ALICE),
                proof,
                None
            ));

            run_to_tick(1 + PERIOD + CHALLENGE_HISTORY_LENGTH + 1);

            assert_eq!(
                ProofsDealer::get_proof_submitters_for_tick(&(1 + PERIOD)),
                None
            );
        });
    }
}
