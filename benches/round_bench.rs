use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tokio_util::codec::{Decoder, Encoder};
use zeno_net::core::codec::{decode_exact, encode_to_bytes};
use zeno_net::core::frame::{Frame, FrameCodec};
use zeno_net::protocol::envelope::{Envelope, ProcedureId};
use zeno_net::protocol::round::{KmdToEthStep, RoundMessage, SignedRoundMessage, Step, StepMessage};

fn collect_sigs(entries: usize) -> SignedRoundMessage {
    let mut step = StepMessage::new(1_000_000u64, 42u64);
    for i in 0..entries {
        step = step.with_entry([i as u8; 20], [0x44; 65], [0x55; 32]);
    }
    SignedRoundMessage {
        signature: [0x11; 65],
        inner: Some(RoundMessage::KmdToEth(Step::new(KmdToEthStep::CollectSigs(step)))),
    }
}

fn bench_round_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_codec");
    let message = collect_sigs(64);

    group.bench_function("encode", |b| {
        b.iter(|| {
            let _ = encode_to_bytes(&message).unwrap();
        })
    });

    let blob = encode_to_bytes(&message).unwrap();
    group.bench_function("decode", |b| {
        b.iter(|| {
            let _: SignedRoundMessage = decode_exact(&blob).unwrap();
        })
    });

    let procedure: ProcedureId = "00112233445566778899aabbccddeeff".parse().unwrap();
    let payload = Envelope::Round {
        procedure,
        message,
    }
    .encode()
    .unwrap();
    group.bench_function("envelope_decode", |b| {
        b.iter(|| {
            let _ = Envelope::decode(&payload).unwrap();
        })
    });

    group.finish();
}

fn bench_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");
    let payload = Bytes::from(vec![0xab; 4096]);

    group.bench_function("encode_decode", |b| {
        b.iter_batched(
            || (FrameCodec::default(), BytesMut::with_capacity(8192)),
            |(mut codec, mut buf)| {
                codec.encode(Frame::Data(payload.clone()), &mut buf).unwrap();
                codec.encode(Frame::Keepalive, &mut buf).unwrap();
                let _ = codec.decode(&mut buf).unwrap();
                let _ = codec.decode(&mut buf).unwrap();
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_round_codec, bench_framing);
criterion_main!(benches);
