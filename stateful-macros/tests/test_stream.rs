use std::num::ParseIntError;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::executor::block_on;
use futures::future::ready;
use futures::stream::{BoxStream, Stream, StreamExt};
use futures::task::noop_waker_ref;
use stateful_macros::resumable;

fn collect<S: Stream>(stream: S) -> Vec<S::Item> {
    block_on(Box::pin(stream).collect())
}

fn nothing() -> Vec<Result<u32, ()>> {
    Vec::new()
}

#[test]
fn test_empty() {
    #[resumable]
    fn gen() -> impl Stream<Item = Result<u32, ()>> {}

    assert_eq!(collect(gen()), nothing());
}

#[test]
fn test_empty_loop() {
    #[resumable]
    fn gen() -> impl Stream<Item = Result<u32, ()>> {
        loop {
            break;
        }
    }

    assert_eq!(collect(gen()), nothing());
}

#[test]
fn test_ints() {
    #[resumable]
    fn gen_ints() -> impl Stream<Item = Result<u32, ()>> {
        let x = {
            yield_!(1);
            let y = 3;
            yield_!(2);
            y
        };
        yield_!(x);
    }

    assert_eq!(collect(gen_ints()), vec![Ok(1), Ok(2), Ok(3)]);
}

#[test]
fn test_break_value() {
    #[resumable]
    fn gen() -> impl Stream<Item = Result<u32, ()>> {
        let x = loop {
            break 5;
        };
        yield_!(x);
    }

    assert_eq!(collect(gen()), vec![Ok(5)]);
}

#[test]
fn test_countdown() {
    #[resumable]
    fn countdown(from: u32) -> impl Stream<Item = Result<u32, ()>> {
        let mut n = from;
        while n > 0 {
            yield_!(n);
            n -= 1;
        }
    }

    assert_eq!(collect(countdown(3)), vec![Ok(3), Ok(2), Ok(1)]);
    assert_eq!(collect(countdown(0)), nothing());
}

#[test]
fn test_moved() {
    #[resumable]
    fn gen(items: Vec<String>) -> impl Stream<Item = Result<String, ()>> {
        for item in items {
            yield_!(item);
        }
    }

    let items = vec!["a".to_string(), "b".to_string()];
    assert_eq!(collect(gen(items)), vec![Ok("a".to_string()), Ok("b".to_string())]);
}

#[test]
fn test_while_let() {
    #[resumable]
    fn drain(mut items: Vec<u32>) -> impl Stream<Item = Result<u32, ()>> {
        while let Some(item) = items.pop() {
            yield_!(item);
        }
    }

    assert_eq!(collect(drain(vec![1, 2, 3])), vec![Ok(3), Ok(2), Ok(1)]);
    assert_eq!(collect(drain(vec![])), nothing());
}

#[test]
fn test_if_let() {
    #[resumable]
    fn maybe(value: Option<u32>) -> impl Stream<Item = Result<u32, ()>> {
        if let Some(v) = value {
            yield_!(v);
            yield_!(v + 1);
        }
    }

    assert_eq!(collect(maybe(Some(4))), vec![Ok(4), Ok(5)]);
    assert_eq!(collect(maybe(None)), nothing());
}

#[test]
fn test_partial_decl() {
    #[resumable]
    fn gen() -> impl Stream<Item = Result<u32, ()>> {
        let c;
        yield_!(1);
        yield_!(2);
        c = 4;
        yield_!(3);
        let b = c;
        yield_!(b);
    }

    assert_eq!(collect(gen()), vec![Ok(1), Ok(2), Ok(3), Ok(4)]);
}

#[test]
fn test_await_between_yields() {
    #[resumable]
    fn doubled(items: Vec<u32>) -> impl Stream<Item = Result<u32, String>> {
        for item in items {
            let value = ready(item * 2).await;
            if value > 4 {
                return Err(format!("too big: {}", value));
            }
            yield_!(value);
        }
    }

    assert_eq!(
        collect(doubled(vec![1, 2, 3, 4])),
        vec![Ok(2), Ok(4), Err("too big: 6".to_string())]
    );
}

#[test]
fn test_try() {
    #[resumable]
    fn parse_all(lines: Vec<String>) -> impl Stream<Item = Result<u32, ParseIntError>> {
        for line in lines {
            let n: u32 = line.parse()?;
            yield_!(n);
        }
    }

    let lines = vec!["1".to_string(), "x".to_string(), "3".to_string()];
    let items = collect(parse_all(lines));
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok(1));
    assert!(items[1].is_err());
}

#[test]
fn test_fused() {
    #[resumable]
    fn one() -> impl Stream<Item = Result<u32, ()>> {
        yield_!(1);
    }

    let mut cx = Context::from_waker(noop_waker_ref());
    let mut stream = Box::pin(one());

    assert_eq!(stream.as_mut().poll_next(&mut cx), Poll::Ready(Some(Ok(1))));
    assert_eq!(stream.as_mut().poll_next(&mut cx), Poll::Ready(None));
    assert_eq!(stream.as_mut().poll_next(&mut cx), Poll::Ready(None));
}

#[test]
fn test_boxed() {
    #[resumable]
    fn numbers(limit: u32) -> BoxStream<'static, Result<u32, ()>> {
        let mut i = 0;
        while i < limit {
            yield_!(i);
            i += 1;
        }
    }

    #[resumable]
    fn unpinned() -> Box<dyn Stream<Item = Result<u32, ()>> + Unpin> {
        yield_!(7);
    }

    assert_eq!(collect(numbers(3)), vec![Ok(0), Ok(1), Ok(2)]);

    let mut stream = unpinned();
    assert_eq!(block_on(stream.next()), Some(Ok(7)));
    assert_eq!(block_on(stream.next()), None);

    let _: Pin<Box<dyn Stream<Item = Result<u32, ()>> + Send>> = numbers(0);
}
